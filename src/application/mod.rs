//! Application layer wiring DTOs and services for the answering pipeline.

pub mod dtos;
pub mod services;

pub use dtos::{
    AskRequest, AskResponse, HealthStatusResponse, IngestDocumentRequest, IngestResponse,
    MetricListResponse,
};
pub use services::{AnswerService, IngestService};
