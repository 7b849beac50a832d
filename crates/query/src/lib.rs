pub mod engine;
pub mod fusion;
pub mod llm;
pub mod mode;
pub mod service;

pub use engine::{EmptyReason, Retrieval, RetrievalConfig, RetrievalEngine, RetrievalTrace};
pub use fusion::{RRF_K, deduplicate, fuse_top_k, reciprocal_rank_fusion};
pub use llm::{AnswerGenerator, LlmEndpoint, UNCONFIGURED_ANSWER, build_context};
pub use mode::{RetrievalMode, resolve, route};
pub use service::{Answer, QueryService, Source};
