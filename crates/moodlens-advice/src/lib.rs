//! moodlens-advice — Persona-driven suggestions for a predicted mood.
//!
//! Moods are turned into a persona prompt and sent to Gemini; without an
//! API key a fixed suggestion table answers instead.

pub mod gemini;
pub mod persona;
pub mod responder;

pub use gemini::{GeminiClient, GeminiConfig};
pub use persona::Persona;
pub use responder::{clean_reply, fallback_suggestion, AdviceError, AdviceResponder, TextGenerator};
