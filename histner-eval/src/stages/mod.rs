//! Pipeline stages, in data-flow order
//!
//! extract -> normalize -> retrieve + predict -> report. Each stage reads the
//! previous stage's JSONL output and writes its own.

pub mod extract;
pub mod normalize;
pub mod predict;
pub mod prompt;
pub mod report;
pub mod retrieve;
