//! # hvacnet
//!
//! Library target of the `hvacnet` binary, exposed so the command
//! implementations and the interactive prompt can be tested directly.

pub mod cli;
