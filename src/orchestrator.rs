//! Bounded generate → validate loop.
//!
//! Each request runs a small state machine:
//!
//! ```text
//!            ┌──────────── invalid, attempt < max ───────────┐
//!            ▼                                               │
//!  Generating{n} ──raw──► Validating{n} ──valid──► Succeeded │
//!                              │                             │
//!                              ├─────────────────────────────┘
//!                              └── invalid, attempt == max ──► Exhausted
//! ```
//!
//! Every attempt sends the same prompt. Exactly one generator call happens
//! per attempt, so a request costs at most `max_attempts` calls. A generator
//! that cannot be reached ends the request at once with
//! [`CopilotError::Generator`].

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CopilotError;
use crate::generation::Generator;
use crate::models::StructuredResult;
use crate::prompt::Prompt;
use crate::validate::{StructuredOutputValidator, ValidationError};

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Generating {
        attempt: u32,
        last: Option<ValidationError>,
    },
    Validating {
        attempt: u32,
        raw: String,
    },
    Succeeded {
        attempts: u32,
        result: StructuredResult,
    },
    Exhausted {
        attempts: u32,
        last: ValidationError,
    },
}

/// A validated result and the number of generator calls it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub result: StructuredResult,
    pub attempts: u32,
}

/// Transition out of `Validating { attempt, raw }`.
pub fn validate_step(
    validator: &StructuredOutputValidator,
    attempt: u32,
    raw: &str,
    max_attempts: u32,
) -> AttemptState {
    match validator.parse(raw) {
        Ok(result) => AttemptState::Succeeded {
            attempts: attempt,
            result,
        },
        Err(err) if attempt >= max_attempts => AttemptState::Exhausted {
            attempts: attempt,
            last: err,
        },
        Err(err) => AttemptState::Generating {
            attempt: attempt + 1,
            last: Some(err),
        },
    }
}

pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    validator: StructuredOutputValidator,
    max_attempts: u32,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, max_attempts: u32) -> Self {
        Self {
            generator,
            validator: StructuredOutputValidator::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run(&self, prompt: &Prompt) -> Result<Answer, CopilotError> {
        let mut state = AttemptState::Generating {
            attempt: 1,
            last: None,
        };

        loop {
            state = match state {
                AttemptState::Generating { attempt, last } => {
                    if let Some(err) = &last {
                        debug!(attempt, previous_error = %err, "regenerating");
                    }
                    let raw = self.generator.generate(prompt).await.map_err(|e| {
                        warn!(attempt, model = self.generator.model_name(), error = %e, "generator call failed");
                        CopilotError::Generator(e)
                    })?;
                    AttemptState::Validating { attempt, raw }
                }
                AttemptState::Validating { attempt, raw } => {
                    let next = validate_step(&self.validator, attempt, &raw, self.max_attempts);
                    if let AttemptState::Generating {
                        last: Some(err), ..
                    } = &next
                    {
                        warn!(attempt, max_attempts = self.max_attempts, error = %err, "model output rejected");
                    }
                    next
                }
                AttemptState::Succeeded { attempts, result } => {
                    info!(attempts, "structured answer produced");
                    return Ok(Answer { result, attempts });
                }
                AttemptState::Exhausted { attempts, last } => {
                    warn!(attempts, error = %last, "generation attempts exhausted");
                    return Err(CopilotError::GenerationExhausted { attempts, last });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted outputs, then repeats the last one.
    struct Scripted {
        outputs: Vec<String>,
        calls: Mutex<Vec<Prompt>>,
    }

    impl Scripted {
        fn new(outputs: &[&str]) -> Self {
            Self {
                outputs: outputs.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, prompt: &Prompt) -> anyhow::Result<String> {
            let mut calls = self.calls.lock().unwrap();
            let i = calls.len().min(self.outputs.len() - 1);
            calls.push(prompt.clone());
            Ok(self.outputs[i].clone())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Generator for Unreachable {
        fn model_name(&self) -> &str {
            "unreachable"
        }
        async fn generate(&self, _prompt: &Prompt) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "sys".into(),
            user: "What is the default gas limit?".into(),
        }
    }

    const VALID: &str = r#"{"reply": "8000000", "update": {}}"#;

    #[tokio::test]
    async fn test_first_valid_output_is_one_call() {
        let generator = Arc::new(Scripted::new(&[VALID]));
        let orchestrator = Orchestrator::new(generator.clone(), 10);
        let answer = orchestrator.run(&prompt()).await.unwrap();
        assert_eq!(answer.attempts, 1);
        assert_eq!(answer.result.reply, "8000000");
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_three_malformed_then_valid_is_four_calls() {
        let generator = Arc::new(Scripted::new(&[
            "not json",
            "{\"reply\": \"x\"}",
            "{\"reply\": \"x\", \"update\": \"{}\"}",
            VALID,
        ]));
        let orchestrator = Orchestrator::new(generator.clone(), 10);
        let answer = orchestrator.run(&prompt()).await.unwrap();
        assert_eq!(answer.attempts, 4);
        assert_eq!(generator.call_count(), 4);

        let calls = generator.calls.lock().unwrap();
        assert!(calls.iter().all(|p| *p == prompt()));
    }

    #[tokio::test]
    async fn test_always_malformed_is_exactly_max_calls() {
        let generator = Arc::new(Scripted::new(&["I refuse to emit JSON"]));
        let orchestrator = Orchestrator::new(generator.clone(), 10);
        let err = orchestrator.run(&prompt()).await.unwrap_err();
        assert_eq!(generator.call_count(), 10);
        match err {
            CopilotError::GenerationExhausted { attempts, last } => {
                assert_eq!(attempts, 10);
                assert_eq!(last, ValidationError::NoJsonObject);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generator_failure_is_terminal() {
        let orchestrator = Orchestrator::new(Arc::new(Unreachable), 10);
        assert!(matches!(
            orchestrator.run(&prompt()).await,
            Err(CopilotError::Generator(_))
        ));
    }

    #[test]
    fn test_validate_step_transitions() {
        let v = StructuredOutputValidator::new();
        assert!(matches!(
            validate_step(&v, 1, VALID, 3),
            AttemptState::Succeeded { attempts: 1, .. }
        ));
        assert_eq!(
            validate_step(&v, 2, "nope", 3),
            AttemptState::Generating {
                attempt: 3,
                last: Some(ValidationError::NoJsonObject)
            }
        );
        assert_eq!(
            validate_step(&v, 3, "nope", 3),
            AttemptState::Exhausted {
                attempts: 3,
                last: ValidationError::NoJsonObject
            }
        );
    }
}
