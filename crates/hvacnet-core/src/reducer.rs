//! # Reducer
//!
//! Drives a reduction run: every pattern in configured order, each
//! pattern's candidates applied against the graph as it evolves.
//!
//! A candidate that needs a decision is parked in a FIFO queue. The queue
//! is drained after the pattern's other candidates and before the next
//! pattern starts, so decisions are asked in the order their aggregates
//! suspended and pattern priority still holds.
//!
//! A run is transactional: the graph and the decision book are restored
//! when a fatal error or a cancelled decision aborts it.

use crate::aggregate;
use crate::config::ReductionConfig;
use crate::decision::{DecisionBook, DecisionHandler, DecisionRequest, Outcome};
use crate::graph::HvacGraph;
use crate::patterns::{Match, Pattern, matcher};
use crate::primitives::MAX_DECISION_ROUNDS;
use crate::system::{PatternStats, ReductionReport};
use crate::HvacError;
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

/// Result of one attempt at a candidate.
#[derive(Debug)]
enum Step {
    Merged,
    Rejected,
    Pending(Vec<DecisionRequest>),
}

/// A candidate waiting for answers.
#[derive(Debug)]
struct Suspended {
    candidate: Match,
    requests: Vec<DecisionRequest>,
    rounds: usize,
}

/// The reduction orchestrator. The only caller of `HvacGraph::merge`.
#[derive(Debug, Clone, Default)]
pub struct Reducer {
    config: ReductionConfig,
    book: DecisionBook,
}

impl Reducer {
    #[must_use]
    pub fn new(config: ReductionConfig) -> Self {
        Self {
            config,
            book: DecisionBook::new(),
        }
    }

    /// Start from answers of an earlier run.
    #[must_use]
    pub fn with_book(config: ReductionConfig, book: DecisionBook) -> Self {
        Self { config, book }
    }

    #[must_use]
    pub fn config(&self) -> &ReductionConfig {
        &self.config
    }

    /// Answers collected so far.
    #[must_use]
    pub fn book(&self) -> &DecisionBook {
        &self.book
    }

    #[must_use]
    pub fn into_book(self) -> DecisionBook {
        self.book
    }

    // =========================================================================
    // RUN
    // =========================================================================

    /// Apply every configured pattern once.
    ///
    /// On error the graph and the book are left exactly as they were.
    pub fn run(
        &mut self,
        graph: &mut HvacGraph,
        handler: &mut dyn DecisionHandler,
    ) -> Result<ReductionReport, HvacError> {
        self.config.validate()?;

        let graph_checkpoint = graph.clone();
        let book_checkpoint = self.book.clone();

        match self.run_patterns(graph, handler) {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, "reduction aborted, graph restored");
                *graph = graph_checkpoint;
                self.book = book_checkpoint;
                Err(e)
            }
        }
    }

    /// Repeat `run` until a pass aggregates nothing or `max_passes` is hit.
    ///
    /// A failing pass restores the graph and the book to their state before
    /// the first pass, not just before the failing one.
    pub fn run_until_stable(
        &mut self,
        graph: &mut HvacGraph,
        handler: &mut dyn DecisionHandler,
        max_passes: usize,
    ) -> Result<Vec<ReductionReport>, HvacError> {
        let graph_checkpoint = graph.clone();
        let book_checkpoint = self.book.clone();

        let mut reports = Vec::new();
        for pass in 0..max_passes {
            let report = match self.run(graph, handler) {
                Ok(report) => report,
                Err(e) => {
                    error!(pass, completed = reports.len(), "earlier passes rolled back");
                    *graph = graph_checkpoint;
                    self.book = book_checkpoint;
                    return Err(e);
                }
            };
            let aggregated = report.total_aggregated();
            reports.push(report);
            if aggregated == 0 {
                debug!(pass, "fixed point reached");
                break;
            }
        }
        Ok(reports)
    }

    fn run_patterns(
        &mut self,
        graph: &mut HvacGraph,
        handler: &mut dyn DecisionHandler,
    ) -> Result<ReductionReport, HvacError> {
        let mut report = ReductionReport::new(graph.element_count());
        let order = self.config.order.clone();

        for pattern in order {
            let stats = self.apply_pattern(graph, handler, pattern, &mut report.decisions_asked)?;
            info!(
                pattern = %pattern,
                matched = stats.matched,
                aggregated = stats.aggregated,
                rejected = stats.rejected,
                deferred = stats.deferred,
                "pattern applied"
            );
            report.passes.push(stats);
        }

        graph.validate()?;
        report.elements_after = graph.element_count();
        info!(
            before = report.elements_before,
            after = report.elements_after,
            "reduction finished"
        );
        Ok(report)
    }

    fn apply_pattern(
        &mut self,
        graph: &mut HvacGraph,
        handler: &mut dyn DecisionHandler,
        pattern: Pattern,
        decisions_asked: &mut usize,
    ) -> Result<PatternStats, HvacError> {
        let scan = matcher(pattern).find_matches(graph, &self.config);
        let mut stats = PatternStats::new(pattern);
        stats.matched = scan.matches.len();
        stats.skipped_mixed = scan.skipped.len();

        let mut suspended = VecDeque::new();
        for candidate in scan.matches {
            match self.try_apply(graph, &candidate)? {
                Step::Merged => stats.aggregated += 1,
                Step::Rejected => stats.rejected += 1,
                Step::Pending(requests) => {
                    stats.deferred += 1;
                    suspended.push_back(Suspended {
                        candidate,
                        requests,
                        rounds: 0,
                    });
                }
            }
        }

        while let Some(mut entry) = suspended.pop_front() {
            *decisions_asked += self.answer(handler, &entry.requests)?;
            entry.rounds += 1;

            match self.try_apply(graph, &entry.candidate)? {
                Step::Merged => stats.aggregated += 1,
                Step::Rejected => stats.rejected += 1,
                Step::Pending(requests) => {
                    if let Some(request) = requests.iter().find(|r| self.book.contains(&r.key)) {
                        return Err(HvacError::InvalidAnswer {
                            key: request.key.clone(),
                            reason: "recorded answer does not resolve the question".into(),
                        });
                    }
                    if entry.rounds >= MAX_DECISION_ROUNDS {
                        let key = requests.first().map(|r| r.key.clone()).unwrap_or_default();
                        return Err(HvacError::InvalidAnswer {
                            key,
                            reason: format!("still unresolved after {} rounds", entry.rounds),
                        });
                    }
                    entry.requests = requests;
                    suspended.push_back(entry);
                }
            }
        }

        Ok(stats)
    }

    /// Build and merge one candidate against the current graph.
    fn try_apply(&self, graph: &mut HvacGraph, candidate: &Match) -> Result<Step, HvacError> {
        let plans = match aggregate::build(graph, candidate, &self.config, &self.book) {
            Ok(Outcome::Ready(plans)) => plans,
            Ok(Outcome::Pending(requests)) => {
                debug!(pattern = %candidate.pattern, questions = requests.len(), "candidate suspended");
                return Ok(Step::Pending(requests));
            }
            Err(e) if e.is_recoverable() => {
                warn!(pattern = %candidate.pattern, error = %e, "candidate rejected");
                return Ok(Step::Rejected);
            }
            Err(e) => return Err(e),
        };

        for plan in &plans {
            let id = graph.merge(plan)?;
            debug!(
                pattern = %plan.pattern,
                aggregate = %id,
                guid = %plan.guid,
                members = plan.members.len(),
                "aggregate merged"
            );
        }
        Ok(Step::Merged)
    }

    /// Ask the handler every question not answered yet. Returns how many
    /// were asked.
    fn answer(
        &mut self,
        handler: &mut dyn DecisionHandler,
        requests: &[DecisionRequest],
    ) -> Result<usize, HvacError> {
        let mut asked = 0;
        for request in requests {
            if self.book.contains(&request.key) {
                continue;
            }
            let answer = handler.decide(request)?;
            debug!(key = %request.key, answer = ?answer, "decision answered");
            self.book.record(request, answer)?;
            asked += 1;
        }
        Ok(asked)
    }
}

// =============================================================================
// TESTS
// =============================================================================
