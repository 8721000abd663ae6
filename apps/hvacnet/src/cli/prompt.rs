//! # Interactive Decisions
//!
//! A `DecisionHandler` that asks open questions on a terminal.

use hvacnet_core::{Answer, DecisionHandler, DecisionRequest, HvacError, Validation};
use std::io::{BufRead, Write};

/// Asks each question on `output` and reads the answer from `input`.
///
/// An empty line takes the default when the question has one. End of
/// input or `q` cancels the decision, which rolls back the whole run.
pub struct PromptHandler<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptHandler<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn write_question(&mut self, request: &DecisionRequest) -> std::io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", request.question)?;
        match &request.validation {
            Validation::Boolean => write!(self.output, "  [y/n]")?,
            Validation::Real { min, max } => write!(self.output, "  [{} .. {}]", min, max)?,
            Validation::Choice(options) => {
                for (index, option) in options.iter().enumerate() {
                    writeln!(self.output, "  {}) {}", index + 1, option)?;
                }
                write!(self.output, "  choice")?;
            }
        }
        if let Some(default) = &request.default {
            write!(self.output, " (default: {})", describe(default))?;
        }
        write!(self.output, ": ")?;
        self.output.flush()
    }
}

impl<R: BufRead, W: Write> DecisionHandler for PromptHandler<R, W> {
    fn decide(&mut self, request: &DecisionRequest) -> Result<Answer, HvacError> {
        let cancelled = || HvacError::DecisionCancelled {
            key: request.key.clone(),
        };

        loop {
            self.write_question(request).map_err(io_error)?;

            let mut line = String::new();
            if self.input.read_line(&mut line).map_err(io_error)? == 0 {
                return Err(cancelled());
            }
            let text = line.trim();
            if text.eq_ignore_ascii_case("q") {
                return Err(cancelled());
            }
            if text.is_empty()
                && let Some(default) = &request.default
            {
                return Ok(default.clone());
            }

            match request.validation.parse(text) {
                Ok(answer) => return Ok(answer),
                Err(reason) => writeln!(self.output, "  invalid answer: {}", reason)
                    .map_err(io_error)?,
            }
        }
    }
}

fn describe(answer: &Answer) -> String {
    match answer {
        Answer::Bool(true) => "yes".to_string(),
        Answer::Bool(false) => "no".to_string(),
        Answer::Real(v) => v.to_string(),
        Answer::Choice(choice) => choice.clone(),
    }
}

fn io_error(e: std::io::Error) -> HvacError {
    HvacError::Io(format!("Prompt: {}", e))
}

// =============================================================================
// TESTS
// =============================================================================
