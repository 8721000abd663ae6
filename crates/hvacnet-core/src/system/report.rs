//! # Reduction Report
//!
//! Per-pattern counters of one reduction run. Counts are always reported,
//! including for candidates that were rejected, so a summary can tell
//! "matched but rejected" apart from "matched and aggregated".

use crate::patterns::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters of one pattern within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternStats {
    pub pattern: Pattern,
    /// Candidates returned by the matcher.
    pub matched: usize,
    /// Candidates merged into the graph.
    pub aggregated: usize,
    /// Candidates dropped after a recoverable failure.
    pub rejected: usize,
    /// Candidates that had to wait for a decision.
    pub deferred: usize,
    /// Components left unreduced because they mix consumers and generators.
    pub skipped_mixed: usize,
}

impl PatternStats {
    #[must_use]
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            matched: 0,
            aggregated: 0,
            rejected: 0,
            deferred: 0,
            skipped_mixed: 0,
        }
    }
}

/// Summary of one `Reducer::run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionReport {
    pub passes: Vec<PatternStats>,
    pub elements_before: usize,
    pub elements_after: usize,
    pub decisions_asked: usize,
}

impl ReductionReport {
    #[must_use]
    pub fn new(elements_before: usize) -> Self {
        Self {
            elements_before,
            elements_after: elements_before,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn total_aggregated(&self) -> usize {
        self.passes.iter().map(|p| p.aggregated).sum()
    }

    #[must_use]
    pub fn total_rejected(&self) -> usize {
        self.passes.iter().map(|p| p.rejected).sum()
    }

    /// Aggregates created for `pattern`.
    #[must_use]
    pub fn aggregated(&self, pattern: Pattern) -> usize {
        self.passes
            .iter()
            .filter(|p| p.pattern == pattern)
            .map(|p| p.aggregated)
            .sum()
    }
}

impl fmt::Display for ReductionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<34} {:>7} {:>10} {:>8} {:>8} {:>7}",
            "pattern", "matched", "aggregated", "rejected", "deferred", "mixed"
        )?;
        for stats in &self.passes {
            writeln!(
                f,
                "{:<34} {:>7} {:>10} {:>8} {:>8} {:>7}",
                stats.pattern.name(),
                stats.matched,
                stats.aggregated,
                stats.rejected,
                stats.deferred,
                stats.skipped_mixed
            )?;
        }
        write!(
            f,
            "elements: {} -> {}, decisions asked: {}",
            self.elements_before, self.elements_after, self.decisions_asked
        )
    }
}
