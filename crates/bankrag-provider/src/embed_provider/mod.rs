//! Embedding providers. Every vector a provider returns has exactly `dim()`
//! values; `embedder_id` is persisted with the index so a backend switch is
//! visible to validation.

mod local;
mod remote;

pub use local::LocalEmbedProvider;
pub use remote::OpenAiEmbedProvider;
