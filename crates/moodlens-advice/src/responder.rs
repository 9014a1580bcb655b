use crate::gemini::{GeminiClient, GeminiConfig};
use crate::persona::Persona;
use std::future::Future;
use thiserror::Error;

pub const FACE_NOT_DETECTED: &str = "Could not detect face properly.";
pub const THINKING: &str = "Thinking...";
pub const QUOTA_LIMIT: &str = "Quota Limit! Wait a bit.";
pub const CALM_DOWN: &str = "Just breathe. Everything will be okay.";
pub const STAY_COOL: &str = "Stay cool.";

#[derive(Error, Debug)]
pub enum AdviceError {
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Response(String),
}

/// Remote text completion used for advice.
pub trait TextGenerator: Send + Sync {
    /// `Ok(None)` when the generator answered with no text.
    fn generate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<Option<String>, AdviceError>> + Send;
}

/// Static suggestion used when no generator is configured.
pub fn fallback_suggestion(mood: &str) -> &'static str {
    match mood {
        "Happy" => "Great energy! Keep crushing it!",
        "Sad" => "Take a deep breath. Listen to some Lo-Fi.",
        "Angry" => "Count to 10. Maybe drink some water?",
        "Neutral" => "Focus mode on. Let's get work done.",
        _ => STAY_COOL,
    }
}

pub fn clean_reply(text: &str) -> String {
    text.trim().replace('*', "").replace("\n\n\n", "\n")
}

// Keep in sync with `moodlens_core::types::is_sentinel_label`.
fn is_sentinel(mood: &str) -> bool {
    matches!(mood, "No Face Detected" | "Error" | "Model Error")
}

/// Turns a predicted mood into a one-paragraph suggestion.
pub struct AdviceResponder<G> {
    generator: Option<G>,
}

impl AdviceResponder<GeminiClient> {
    /// Build from Gemini settings; `None` or a client that fails to build
    /// leaves the responder on the fallback table.
    pub fn configure(config: Option<GeminiConfig>) -> Self {
        let Some(config) = config else {
            tracing::warn!("GEMINI_API_KEY not set, using built-in suggestions");
            return Self::unconfigured();
        };
        match GeminiClient::new(config) {
            Ok(client) => {
                tracing::info!(model = %client.model(), "Gemini advice configured");
                Self::with_generator(client)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Gemini client setup failed, using built-in suggestions"
                );
                Self::unconfigured()
            }
        }
    }
}

impl<G: TextGenerator> AdviceResponder<G> {
    pub fn with_generator(generator: G) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    pub fn unconfigured() -> Self {
        Self { generator: None }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn advise(&self, mood: &str, role: &str) -> String {
        if is_sentinel(mood) {
            return FACE_NOT_DETECTED.to_string();
        }
        let Some(generator) = &self.generator else {
            return fallback_suggestion(mood).to_string();
        };

        let persona = Persona::from_role(role);
        match generator.generate(&persona.prompt(mood)).await {
            Ok(Some(text)) if !text.trim().is_empty() => clean_reply(&text),
            Ok(_) => THINKING.to_string(),
            Err(AdviceError::QuotaExceeded(detail)) => {
                tracing::warn!(detail = %detail, "advice quota exceeded");
                QUOTA_LIMIT.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, persona = %persona, "advice generation failed");
                CALM_DOWN.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    enum Reply {
        Text(&'static str),
        Empty,
        Quota,
        Fail,
    }

    struct StubGenerator {
        reply: Reply,
        prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for StubGenerator {
        async fn generate(&self, prompt: &str) -> Result<Option<String>, AdviceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.reply {
                Reply::Text(t) => Ok(Some(t.to_string())),
                Reply::Empty => Ok(None),
                Reply::Quota => Err(AdviceError::QuotaExceeded("429".into())),
                Reply::Fail => Err(AdviceError::Api {
                    status: 500,
                    body: "boom".into(),
                }),
            }
        }
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(fallback_suggestion("Happy"), "Great energy! Keep crushing it!");
        assert_eq!(fallback_suggestion("Sad"), "Take a deep breath. Listen to some Lo-Fi.");
        assert_eq!(fallback_suggestion("Angry"), "Count to 10. Maybe drink some water?");
        assert_eq!(fallback_suggestion("Neutral"), "Focus mode on. Let's get work done.");
        assert_eq!(fallback_suggestion("Surprise"), "Stay cool.");
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(clean_reply("  **Chill** kar\n\n\nyaar  "), "Chill kar\nyaar");
        assert_eq!(clean_reply("a\n\nb"), "a\n\nb");
    }

    #[tokio::test]
    async fn test_sentinel_moods_skip_generator() {
        let responder = AdviceResponder::with_generator(StubGenerator::new(Reply::Text("hi")));
        for mood in ["No Face Detected", "Error", "Model Error"] {
            assert_eq!(responder.advise(mood, "Friend").await, FACE_NOT_DETECTED);
        }
        assert!(responder.generator.as_ref().unwrap().prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_uses_table() {
        let responder = AdviceResponder::<StubGenerator>::unconfigured();
        assert!(!responder.is_configured());
        assert_eq!(responder.advise("Sad", "Poet").await, fallback_suggestion("Sad"));
        assert_eq!(responder.advise("Error", "Poet").await, FACE_NOT_DETECTED);
    }

    #[tokio::test]
    async fn test_reply_is_cleaned_and_persona_prompt_sent() {
        let generator = StubGenerator::new(Reply::Text(" *Shabash* \n\n\nbhai "));
        let responder = AdviceResponder::with_generator(generator);
        assert_eq!(responder.advise("Happy", "Strict").await, "Shabash \nbhai");

        let prompts = responder.generator.as_ref().unwrap().prompts.lock().unwrap().clone();
        assert_eq!(prompts, vec![Persona::Strict.prompt("Happy")]);
    }

    #[tokio::test]
    async fn test_unknown_role_uses_friend_prompt() {
        let responder = AdviceResponder::with_generator(StubGenerator::new(Reply::Text("ok")));
        responder.advise("Neutral", "Wizard").await;
        let prompts = responder.generator.as_ref().unwrap().prompts.lock().unwrap().clone();
        assert_eq!(prompts, vec![Persona::Friend.prompt("Neutral")]);
    }

    #[tokio::test]
    async fn test_generator_outcomes() {
        let empty = AdviceResponder::with_generator(StubGenerator::new(Reply::Empty));
        assert_eq!(empty.advise("Happy", "Friend").await, THINKING);

        let blank = AdviceResponder::with_generator(StubGenerator::new(Reply::Text("   ")));
        assert_eq!(blank.advise("Happy", "Friend").await, THINKING);

        let quota = AdviceResponder::with_generator(StubGenerator::new(Reply::Quota));
        assert_eq!(quota.advise("Happy", "Friend").await, QUOTA_LIMIT);

        let failing = AdviceResponder::with_generator(StubGenerator::new(Reply::Fail));
        assert_eq!(failing.advise("Happy", "Friend").await, CALM_DOWN);
    }

    #[test]
    fn test_configure_without_key_is_unconfigured() {
        assert!(!AdviceResponder::configure(None).is_configured());
    }
}
