//! Infrastructure layer: model API client, embeddings, storage and document readers.

pub mod documents;
pub mod embeddings;
pub mod http_client;
pub mod storage;

pub use embeddings::SimpleEmbedEngine;
pub use http_client::OpenAiClient;
pub use storage::SledStore;
