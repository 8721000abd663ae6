//! # Decisions
//!
//! Explicit suspend/resume protocol for attribute computations that need
//! external input.
//!
//! A computation that cannot proceed returns `Outcome::Pending` carrying the
//! questions it needs answered. The `Reducer` collects them, asks a
//! `DecisionHandler` in suspension order, records every answer in the
//! run's `DecisionBook` and re-runs the computation. A key is never asked
//! twice, so a recorded book replays a run deterministically.

use crate::HvacError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ANSWERS & VALIDATION
// =============================================================================

/// A typed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Bool(bool),
    Real(f64),
    Choice(String),
}

/// The validation predicate attached to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    Boolean,
    Real { min: f64, max: f64 },
    Choice(Vec<String>),
}

impl Validation {
    /// Check an answer against this predicate.
    pub fn check(&self, answer: &Answer) -> Result<(), String> {
        match (self, answer) {
            (Self::Boolean, Answer::Bool(_)) => Ok(()),
            (Self::Real { min, max }, Answer::Real(v)) => {
                if v.is_finite() && *v >= *min && *v <= *max {
                    Ok(())
                } else {
                    Err(format!("{} is outside [{}, {}]", v, min, max))
                }
            }
            (Self::Choice(options), Answer::Choice(choice)) => {
                if options.iter().any(|o| o == choice) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not one of {:?}", choice, options))
                }
            }
            (expected, got) => Err(format!("expected {:?}, got {:?}", expected, got)),
        }
    }

    /// Parse free text into an answer of the expected type.
    pub fn parse(&self, text: &str) -> Result<Answer, String> {
        let text = text.trim();
        let answer = match self {
            Self::Boolean => match text.to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Answer::Bool(true),
                "n" | "no" | "false" | "0" => Answer::Bool(false),
                other => return Err(format!("'{}' is not yes/no", other)),
            },
            Self::Real { .. } => Answer::Real(
                text.parse::<f64>()
                    .map_err(|e| format!("'{}' is not a number: {}", text, e))?,
            ),
            Self::Choice(options) => match text.parse::<usize>() {
                Ok(index) if index >= 1 && index <= options.len() => {
                    Answer::Choice(options[index - 1].clone())
                }
                _ => Answer::Choice(text.to_string()),
            },
        };
        self.check(&answer)?;
        Ok(answer)
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// A question raised by a blocked computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Stable key for caching and replay.
    pub key: String,
    pub question: String,
    pub default: Option<Answer>,
    pub validation: Validation,
}

impl DecisionRequest {
    /// A yes/no question.
    #[must_use]
    pub fn boolean(key: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            question: question.into(),
            default: None,
            validation: Validation::Boolean,
        }
    }

    /// A question with a fixed set of options.
    #[must_use]
    pub fn choice(
        key: impl Into<String>,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self {
            key: key.into(),
            question: question.into(),
            default: None,
            validation: Validation::Choice(options),
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Answer) -> Self {
        self.default = Some(default);
        self
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of a computation that may have to wait for answers.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ready(T),
    Pending(Vec<DecisionRequest>),
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ready(v) => Outcome::Ready(f(v)),
            Self::Pending(requests) => Outcome::Pending(requests),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

// =============================================================================
// DECISION BOOK
// =============================================================================

/// Answers collected during a run, keyed by stable key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionBook {
    answers: BTreeMap<String, Answer>,
    /// Keys in the order they were answered.
    log: Vec<String>,
}

impl DecisionBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Answer> {
        self.answers.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.answers.contains_key(key)
    }

    /// Record the answer to a request.
    ///
    /// Fails if the answer does not validate or the key was already answered.
    pub fn record(&mut self, request: &DecisionRequest, answer: Answer) -> Result<(), HvacError> {
        if self.answers.contains_key(&request.key) {
            return Err(HvacError::InvalidAnswer {
                key: request.key.clone(),
                reason: "already answered".into(),
            });
        }
        request
            .validation
            .check(&answer)
            .map_err(|reason| HvacError::InvalidAnswer {
                key: request.key.clone(),
                reason,
            })?;
        self.answers.insert(request.key.clone(), answer);
        self.log.push(request.key.clone());
        Ok(())
    }

    /// Answer a yes/no request from the book, or suspend on it.
    #[must_use]
    pub fn ask_bool(&self, request: DecisionRequest) -> Outcome<bool> {
        match self.answers.get(&request.key) {
            Some(Answer::Bool(b)) => Outcome::Ready(*b),
            _ => Outcome::Pending(vec![request]),
        }
    }

    /// Answer a choice request from the book, or suspend on it.
    #[must_use]
    pub fn ask_choice(&self, request: DecisionRequest) -> Outcome<String> {
        match self.answers.get(&request.key) {
            Some(Answer::Choice(c)) => Outcome::Ready(c.clone()),
            _ => Outcome::Pending(vec![request]),
        }
    }

    /// Keys in answer order.
    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<String, Answer> {
        &self.answers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// The external decision collaborator.
///
/// Returning `HvacError::DecisionCancelled` aborts the whole run.
pub trait DecisionHandler {
    fn decide(&mut self, request: &DecisionRequest) -> Result<Answer, HvacError>;
}

impl<F> DecisionHandler for F
where
    F: FnMut(&DecisionRequest) -> Result<Answer, HvacError>,
{
    fn decide(&mut self, request: &DecisionRequest) -> Result<Answer, HvacError> {
        self(request)
    }
}

/// Answers with the request's default and cancels when there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultsHandler;

impl DecisionHandler for DefaultsHandler {
    fn decide(&mut self, request: &DecisionRequest) -> Result<Answer, HvacError> {
        request
            .default
            .clone()
            .ok_or_else(|| HvacError::DecisionCancelled {
                key: request.key.clone(),
            })
    }
}

/// Answers from a recorded log, delegating unknown keys to `fallback`.
#[derive(Debug, Clone)]
pub struct ReplayHandler<H> {
    recorded: BTreeMap<String, Answer>,
    fallback: H,
}

impl<H: DecisionHandler> ReplayHandler<H> {
    #[must_use]
    pub fn new(recorded: BTreeMap<String, Answer>, fallback: H) -> Self {
        Self { recorded, fallback }
    }
}

impl<H: DecisionHandler> DecisionHandler for ReplayHandler<H> {
    fn decide(&mut self, request: &DecisionRequest) -> Result<Answer, HvacError> {
        match self.recorded.get(&request.key) {
            Some(answer) => Ok(answer.clone()),
            None => self.fallback.decide(request),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
