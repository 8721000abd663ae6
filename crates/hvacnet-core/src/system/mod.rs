//! # System Module
//!
//! Run reports and network metrics. Both are pure summaries of engine
//! state and never feed back into reduction.

mod metrics;
mod report;

pub use metrics::*;
pub use report::*;
