//! Command-line entry points.

pub mod narrate;
