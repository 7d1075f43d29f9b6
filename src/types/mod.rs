//! Shared identifiers and core types for the gateway

pub mod error;

pub use error::*;

/// Name of a managed backend service, as declared in the asset catalog.
pub type ServiceName = String;

/// Identifier of a calling application, used for policy lookup.
pub type AppId = String;

/// Capability name an asset implements (e.g. `llm-runtime`).
pub type Capability = String;

/// Capability implemented by chat/embedding model runtimes.
pub const CAP_LLM_RUNTIME: &str = "llm-runtime";
/// Capability implemented by vector search backends.
pub const CAP_VECTOR_STORE: &str = "vector-store";
/// Capability implemented by cache/queue backends.
pub const CAP_CACHE_QUEUE: &str = "cache-queue";
