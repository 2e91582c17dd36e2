//! Mode-switched embedding and generation backends plus the process-wide
//! [`ProviderRegistry`] that caches them.

pub mod embed_provider;
pub mod generate;
mod http;
pub mod registry;

pub use embed_provider::{LocalEmbedProvider, OpenAiEmbedProvider};
pub use generate::{OllamaGenerator, OpenAiGenerator};
pub use registry::{DefaultFactory, ProviderFactory, ProviderRegistry};
