//! Classify-then-dispatch workflow
//!
//! ```text
//! Start ─► Classifying ─┬─► Processing(Academic) ─┐
//!                       └─► Processing(Coding)   ─┴─► End
//! ```
//!
//! Each run walks the graph once through the transition function. The classifier
//! sets the label exactly once, the selected handler sets the response
//! exactly once, and no stage is visited twice. A classifier failure is
//! replaced by the router's fallback label so some handler always runs.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::error::{RouterError, RunError};
use crate::handler::Handler;
use crate::types::{Completion, Label, RunOutcome, Stage};

/// Transient record threaded through a single run
#[derive(Debug)]
struct WorkflowState {
    query: String,
    label: Option<Label>,
    fell_back: bool,
    completion: Option<Completion>,
    stages: Vec<Stage>,
}

impl WorkflowState {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            label: None,
            fell_back: false,
            completion: None,
            stages: Vec::with_capacity(4),
        }
    }

    fn into_outcome(self) -> Result<RunOutcome, RunError> {
        match (self.label, self.completion) {
            (Some(label), Some(completion)) => Ok(RunOutcome {
                query: self.query,
                label,
                response: completion.text,
                model: completion.model,
                fell_back: self.fell_back,
                stages: self.stages,
            }),
            _ => Err(RunError::Incomplete { stage: Stage::End }),
        }
    }
}

/// The routing graph: one classifier, one handler per label
pub struct Router {
    classifier: Arc<dyn Classifier>,
    academic: Handler,
    coding: Handler,
    fallback: Label,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("classifier", &self.classifier.name())
            .field("academic", &self.academic)
            .field("coding", &self.coding)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl Router {
    /// Wire a router. `academic` and `coding` must carry the matching label.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        academic: Handler,
        coding: Handler,
    ) -> Result<Self, RouterError> {
        for (slot, handler) in [(Label::Academic, &academic), (Label::Coding, &coding)] {
            if handler.label() != slot {
                return Err(RouterError::HandlerMismatch {
                    slot,
                    found: handler.label(),
                });
            }
        }
        Ok(Self {
            classifier,
            academic,
            coding,
            fallback: Label::Academic,
        })
    }

    /// Label used when the classifier itself fails (default: academic)
    pub fn with_fallback(mut self, fallback: Label) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn fallback(&self) -> Label {
        self.fallback
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn handler(&self, label: Label) -> &Handler {
        match label {
            Label::Academic => &self.academic,
            Label::Coding => &self.coding,
        }
    }

    /// Run the workflow for one query
    pub async fn run(&self, query: &str) -> Result<RunOutcome, RunError> {
        let mut state = WorkflowState::new(query);
        let mut stage = Stage::Start;

        loop {
            state.stages.push(stage);
            if stage == Stage::End {
                break;
            }
            let next = self.step(stage, &mut state).await?;
            debug!("Transition {} -> {}", stage, next);
            stage = next;
        }

        let outcome = state.into_outcome()?;
        info!(
            "Routed query to {} ({}, fallback={}), response {} chars",
            outcome.label,
            outcome.model,
            outcome.fell_back,
            outcome.response.len()
        );
        Ok(outcome)
    }

    /// Transition function: perform the work of `stage` and return the next one
    async fn step(&self, stage: Stage, state: &mut WorkflowState) -> Result<Stage, RunError> {
        match stage {
            Stage::Start => Ok(Stage::Classifying),
            Stage::Classifying => {
                let label = match self.classifier.classify(&state.query).await {
                    Ok(label) => label,
                    Err(e) => {
                        warn!(
                            "{} classifier failed, falling back to {}: {:#}",
                            self.classifier.name(),
                            self.fallback,
                            e
                        );
                        state.fell_back = true;
                        self.fallback
                    }
                };
                state.label = Some(label);
                Ok(Stage::Processing(label))
            }
            Stage::Processing(label) => {
                let handler = self.handler(label);
                match handler.dispatch(&state.query).await {
                    Ok(completion) => {
                        state.completion = Some(completion);
                        Ok(Stage::End)
                    }
                    Err(source) => {
                        warn!(
                            "{} handler failed (retryable={}): {}",
                            label,
                            source.is_retryable(),
                            source
                        );
                        Err(RunError::Backend { label, source })
                    }
                }
            }
            Stage::End => Err(RunError::Incomplete { stage }),
        }
    }
}
