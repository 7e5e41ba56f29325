//! Shared types for tutor-core

use serde::{Deserialize, Serialize};

/// Coarse subject classification that selects the handler for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// General-purpose explanation (science, history, maths, ...)
    #[default]
    Academic,
    /// Programming questions
    Coding,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Academic, Label::Coding];

    /// Parse a label leniently (case and surrounding whitespace ignored)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "academic" => Some(Self::Academic),
            "coding" | "code" => Some(Self::Coding),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Coding => "coding",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node of the routing graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Classifying,
    Processing(Label),
    End,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Classifying => write!(f, "classifying"),
            Self::Processing(label) => write!(f, "{}-processing", label),
            Self::End => write!(f, "end"),
        }
    }
}

/// Text returned by a backend, tagged with the model that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Result of one completed workflow run.
///
/// Carries everything the history store needs: the query, the routing
/// decision and the response.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub query: String,
    pub label: Label,
    pub response: String,
    pub model: String,
    /// True when the classifier failed and the fallback label was used
    pub fell_back: bool,
    /// Stages visited, in order
    pub stages: Vec<Stage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Academic.to_string(), "academic");
        assert_eq!(Label::Coding.to_string(), "coding");
    }

    #[test]
    fn test_label_parse() {
        assert_eq!(Label::parse("Academic"), Some(Label::Academic));
        assert_eq!(Label::parse("  CODING\n"), Some(Label::Coding));
        assert_eq!(Label::parse("code"), Some(Label::Coding));
        assert_eq!(Label::parse("maths"), None);
    }

    #[test]
    fn test_label_serde_lowercase() {
        let json = serde_json::to_string(&Label::Coding).unwrap();
        assert_eq!(json, "\"coding\"");
        let back: Label = serde_json::from_str("\"academic\"").unwrap();
        assert_eq!(back, Label::Academic);
    }

    #[test]
    fn test_label_default_is_academic() {
        assert_eq!(Label::default(), Label::Academic);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Start.to_string(), "start");
        assert_eq!(Stage::Processing(Label::Coding).to_string(), "coding-processing");
        assert_eq!(Stage::End.to_string(), "end");
    }
}
