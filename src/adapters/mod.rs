//! Protocol adapters
//!
//! One adapter per infrastructure capability. Each presents a uniform
//! contract and hides the backend's own dialect; the LLM adapter is the only
//! one with a translation layer, the other two wrap ecosystem clients.

pub mod cache;
pub mod llm;
pub mod vector;

pub use cache::CacheQueueAdapter;
pub use llm::{
    ChatChoice, ChatMessage, ChatRequest, EmbeddingData, LlmRuntime, LlmRuntimeAdapter, Protocol,
    UnifiedChatResult, UnifiedEmbeddingResult, Usage,
};
pub use vector::{CollectionInfo, VectorPoint, VectorStoreAdapter, VectorUpsert};
