pub mod simple_engine;

pub use simple_engine::{SimpleEmbedEngine, DEFAULT_SIMPLE_DIMENSIONS, DEFAULT_SIMPLE_MODEL};
