//! Per-recipe diagnostics.

pub mod logger;

pub use logger::{LogEntry, LogLevel, RecipeLog};
