//! Bounded pool of browser sessions for the rendered strategy.

pub mod manager;

pub use manager::{ContextHandle, PoolManager};
