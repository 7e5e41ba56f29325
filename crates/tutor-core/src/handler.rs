//! Branch handlers
//!
//! A handler frames the query for its branch, sends it to its backend once
//! and passes the backend's text through. The academic and coding handlers
//! are the same type with a different backend and template.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::backends::Backend;
use crate::error::BackendError;
use crate::types::{Completion, Label};

/// Placeholder replaced by the query in a prompt template
pub const QUERY_PLACEHOLDER: &str = "{query}";

pub const ACADEMIC_PROMPT: &str = "As an AI tutor, provide a clear explanation for: {query}";
pub const CODING_PROMPT: &str =
    "As an expert coding tutor, help with this programming question: {query}";

/// Default bound on a single backend call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Handler {
    label: Label,
    backend: Arc<dyn Backend>,
    template: String,
    timeout: Duration,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("label", &self.label)
            .field("backend", &self.backend.name())
            .field("model", &self.backend.model())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Handler {
    /// Handler for `label` with that branch's default prompt and timeout
    pub fn new(label: Label, backend: Arc<dyn Backend>) -> Self {
        let template = match label {
            Label::Academic => ACADEMIC_PROMPT,
            Label::Coding => CODING_PROMPT,
        };
        Self {
            label,
            backend,
            template: template.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Build the prompt actually sent to the backend
    pub fn frame(&self, query: &str) -> String {
        if self.template.contains(QUERY_PLACEHOLDER) {
            self.template.replace(QUERY_PLACEHOLDER, query)
        } else {
            query.to_string()
        }
    }

    /// Issue the single backend request for this branch
    pub async fn dispatch(&self, query: &str) -> Result<Completion, BackendError> {
        let prompt = self.frame(query);
        debug!(
            "{} handler dispatching to {} ({})",
            self.label,
            self.backend.name(),
            self.backend.model()
        );

        match tokio::time::timeout(self.timeout, self.backend.complete(&prompt)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                backend: self.backend.name().to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the prompts it receives and echoes them back
    struct EchoBackend {
        prompts: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl EchoBackend {
        fn new(delay: Duration) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                delay,
            }
        }
    }

    #[async_trait]
    impl Backend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo-1"
        }
        async fn complete(&self, prompt: &str) -> Result<Completion, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            tokio::time::sleep(self.delay).await;
            Ok(Completion {
                text: format!("echo: {}", prompt),
                model: "echo-1".to_string(),
            })
        }
    }

    #[test]
    fn test_default_templates() {
        let backend = Arc::new(EchoBackend::new(Duration::ZERO));
        let academic = Handler::new(Label::Academic, backend.clone());
        let coding = Handler::new(Label::Coding, backend);
        assert_eq!(
            academic.frame("What is entropy?"),
            "As an AI tutor, provide a clear explanation for: What is entropy?"
        );
        assert_eq!(
            coding.frame("Reverse a list"),
            "As an expert coding tutor, help with this programming question: Reverse a list"
        );
    }

    #[test]
    fn test_template_without_placeholder_sends_raw_query() {
        let backend = Arc::new(EchoBackend::new(Duration::ZERO));
        let h = Handler::new(Label::Academic, backend).with_template("no placeholder");
        assert_eq!(h.frame("raw"), "raw");
    }

    #[tokio::test]
    async fn test_dispatch_sends_framed_prompt_once() {
        let backend = Arc::new(EchoBackend::new(Duration::ZERO));
        let h = Handler::new(Label::Coding, backend.clone()).with_template("Q: {query}");
        let completion = h.dispatch("sort a vec").await.unwrap();
        assert_eq!(completion.text, "echo: Q: sort a vec");
        assert_eq!(completion.model, "echo-1");
        assert_eq!(*backend.prompts.lock().unwrap(), vec!["Q: sort a vec".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatch_times_out() {
        let backend = Arc::new(EchoBackend::new(Duration::from_secs(5)));
        let h = Handler::new(Label::Academic, backend).with_timeout(Duration::from_millis(20));
        let err = h.dispatch("slow").await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.backend(), "echo");
    }

    #[test]
    fn test_accessors() {
        let backend = Arc::new(EchoBackend::new(Duration::ZERO));
        let h = Handler::new(Label::Coding, backend);
        assert_eq!(h.label(), Label::Coding);
        assert_eq!(h.backend_name(), "echo");
        assert_eq!(h.model(), "echo-1");
    }
}
