//! # Formats Module
//!
//! The network document: the JSON shape in which the loading collaborator
//! hands over classified elements and their resolved port connections.
//!
//! File I/O operations are in the app layer.

mod document;

pub use document::*;
