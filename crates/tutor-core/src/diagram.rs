//! Text renderings of the routing graph

use crate::router::Router;
use crate::types::Label;

/// Mermaid flowchart of the routing graph, paste into any Mermaid viewer
pub fn render_mermaid(router: &Router) -> String {
    let mut out = String::from("graph TD\n");
    out.push_str("    start([start]) --> classifier{\"classifier (");
    out.push_str(router.classifier_name());
    out.push_str(")\"}\n");

    for label in Label::ALL {
        let handler = router.handler(label);
        out.push_str(&format!(
            "    classifier -- {label} --> {label}[\"{label}: {} / {}\"]\n",
            handler.backend_name(),
            handler.model(),
        ));
    }
    for label in Label::ALL {
        out.push_str(&format!("    {} --> finish([end])\n", label));
    }
    out.push_str(&format!(
        "    classifier -. error: fallback {} .-> {}\n",
        router.fallback(),
        router.fallback()
    ));
    out
}

/// Plain-text rendering for terminals
pub fn render_ascii(router: &Router) -> String {
    let academic = router.handler(Label::Academic);
    let coding = router.handler(Label::Coding);
    format!(
        "start\n  |\n  v\nclassifier ({classifier}; on error -> {fallback})\n  |\n  +-- academic --> {a_backend} ({a_model})\n  |                   |\n  +-- coding ----> {c_backend} ({c_model})\n                      |\n                      v\n                     end\n",
        classifier = router.classifier_name(),
        fallback = router.fallback(),
        a_backend = academic.backend_name(),
        a_model = academic.model(),
        c_backend = coding.backend_name(),
        c_model = coding.model(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Backend;
    use crate::classifier::KeywordClassifier;
    use crate::error::BackendError;
    use crate::handler::Handler;
    use crate::types::Completion;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Backend for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn model(&self) -> &str {
            self.1
        }
        async fn complete(&self, _prompt: &str) -> Result<Completion, BackendError> {
            unreachable!("diagram rendering never dispatches")
        }
    }

    fn router() -> Router {
        Router::new(
            Arc::new(KeywordClassifier::default()),
            Handler::new(
                Label::Academic,
                Arc::new(Named("groq", "llama-3.3-70b-versatile")),
            ),
            Handler::new(Label::Coding, Arc::new(Named("openrouter", "deepcoder"))),
        )
        .unwrap()
    }

    #[test]
    fn test_mermaid_has_every_edge() {
        let m = render_mermaid(&router());
        assert!(m.starts_with("graph TD\n"));
        assert!(m.contains("start([start]) --> classifier"));
        assert!(m.contains("classifier -- academic --> academic[\"academic: groq / llama-3.3-70b-versatile\"]"));
        assert!(m.contains("classifier -- coding --> coding[\"coding: openrouter / deepcoder\"]"));
        assert!(m.contains("academic --> finish([end])"));
        assert!(m.contains("coding --> finish([end])"));
        assert!(m.contains("fallback academic"));
    }

    #[test]
    fn test_ascii_names_backends() {
        let a = render_ascii(&router());
        assert!(a.contains("classifier (keyword; on error -> academic)"));
        assert!(a.contains("groq (llama-3.3-70b-versatile)"));
        assert!(a.contains("openrouter (deepcoder)"));
        assert!(a.trim_end().ends_with("end"));
    }
}
