//! New-home listing collection.
//!
//! Recipes describe one (builder, community, kind) each; the runner
//! executes them concurrently through a shared fetch layer, normalizes
//! their raw records into [`listing::Listing`]s and merges the result
//! into a single [`runner::RunReport`].

pub mod acquisition;
pub mod audit;
pub mod builders;
pub mod cli;
pub mod config;
pub mod error;
pub mod listing;
pub mod normalize;
pub mod pool;
pub mod recipe;
pub mod renderer;
pub mod runner;
pub mod sink;
pub mod stealth;
