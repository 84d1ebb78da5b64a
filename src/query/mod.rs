pub mod engine;
pub mod graph;

pub use engine::{QueryEngine, UrlFilter};
pub use graph::{VisitCache, VisitGraph, DEFAULT_MAX_NODES};
