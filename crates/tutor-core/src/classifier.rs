//! Query classification
//!
//! Decides whether a query is an academic or a coding question. Two
//! strategies are provided:
//!
//! - [`KeywordClassifier`]: whole-word match against a list of coding signal
//!   terms. Pure, fast, never fails.
//! - [`ModelClassifier`]: asks a lightweight backend for a one-word verdict.
//!   Can fail; the router turns a failure into its fallback label.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

use crate::backends::Backend;
use crate::types::Label;

/// Terms whose presence marks a query as a programming question
pub const DEFAULT_CODING_TERMS: &[&str] = &[
    "code",
    "coding",
    "program",
    "programming",
    "function",
    "class",
    "method",
    "algorithm",
    "python",
    "java",
    "javascript",
    "typescript",
    "rust",
    "c++",
    "sql",
    "compile",
    "compiler",
    "debug",
    "bug",
    "script",
    "api",
    "regex",
    "recursion",
    "array",
    "data structure",
    "linked list",
    "binary tree",
    "hash map",
    "stack trace",
];

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name for logs and the service description
    fn name(&self) -> &str;

    async fn classify(&self, query: &str) -> Result<Label>;
}

/// Lexical classifier: coding if any signal term appears as a whole word
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    terms: Vec<String>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CODING_TERMS.iter().copied())
    }
}

impl KeywordClassifier {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| normalize(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Classify without the async wrapper. Total: every input gets a label.
    pub fn label_for(&self, query: &str) -> Label {
        let haystack = format!(" {} ", normalize(query));
        let hit = self.terms.iter().find(|term| {
            ["", "s", "es"]
                .iter()
                .any(|suffix| haystack.contains(&format!(" {}{} ", term, suffix)))
        });

        match hit {
            Some(term) => {
                debug!("Coding signal term {:?} found", term);
                Label::Coding
            }
            None => Label::Academic,
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, query: &str) -> Result<Label> {
        Ok(self.label_for(query))
    }
}

/// Lowercase and collapse everything that is not part of a word into single
/// spaces. `+` and `#` are kept so "c++" and "c#" survive.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classifier backed by a small language model
pub struct ModelClassifier {
    backend: Arc<dyn Backend>,
}

impl ModelClassifier {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    fn prompt(query: &str) -> String {
        format!(
            "Classify this question for a tutoring service. Respond with ONLY one word:\n\
             - ACADEMIC: science, maths, history, languages or any general subject\n\
             - CODING: programming, software, algorithms or debugging\n\n\
             Question: {}\n\nClassification:",
            query
        )
    }
}

#[async_trait]
impl Classifier for ModelClassifier {
    fn name(&self) -> &str {
        "model"
    }

    async fn classify(&self, query: &str) -> Result<Label> {
        let completion = self
            .backend
            .complete(&Self::prompt(query))
            .await
            .with_context(|| format!("classifier backend {} failed", self.backend.name()))?;

        parse_verdict(&completion.text)
    }
}

/// Read a one-word verdict; anything else is an error
fn parse_verdict(text: &str) -> Result<Label> {
    let upper = text.trim().to_uppercase();
    let coding = upper.contains("CODING");
    let academic = upper.contains("ACADEMIC");
    match (academic, coding) {
        (true, false) => Ok(Label::Academic),
        (false, true) => Ok(Label::Coding),
        _ => Err(anyhow!("unparseable classifier reply: {:?}", text.trim())),
    }
}
