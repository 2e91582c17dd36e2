//! Text-generation clients. Both take a fully composed prompt and return the
//! model's answer text.

mod ollama;
mod openai;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;
