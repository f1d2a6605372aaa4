//! Text-generation collaborator: trait seam and the Gemini client.

pub mod gemini;

pub use gemini::{GeminiClient, GeminiError};

use async_trait::async_trait;

/// A collaborator that turns one text prompt into generated text.
/// Implemented by [`GeminiClient`]; tests swap in scripted fakes.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GeminiError>;
}
