//! Public API for embedded usage

pub mod monitor;
pub mod pipeline;
