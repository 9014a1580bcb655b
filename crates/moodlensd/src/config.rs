use moodlens_advice::GeminiConfig;
use moodlens_core::ModelFiles;

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

impl BusKind {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("system") {
            BusKind::System
        } else {
            BusKind::Session
        }
    }
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Classifier, label decoder and landmark model locations.
    pub models: ModelFiles,
    /// Bus to serve on (`MOODLENS_BUS=system` for the system bus).
    pub bus: BusKind,
    /// Gemini settings; `None` without `GEMINI_API_KEY`.
    pub gemini: Option<GeminiConfig>,
    /// Largest accepted upload in bytes.
    pub max_image_bytes: usize,
}

impl Config {
    /// Load configuration from `MOODLENS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            models: ModelFiles::from_env(),
            bus: std::env::var("MOODLENS_BUS")
                .map(|v| BusKind::parse(&v))
                .unwrap_or(BusKind::Session),
            gemini: GeminiConfig::from_env(),
            max_image_bytes: env_usize("MOODLENS_MAX_IMAGE_BYTES", 16 * 1024 * 1024),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_kind_parse() {
        assert_eq!(BusKind::parse("system"), BusKind::System);
        assert_eq!(BusKind::parse("SYSTEM"), BusKind::System);
        assert_eq!(BusKind::parse("session"), BusKind::Session);
        assert_eq!(BusKind::parse(""), BusKind::Session);
    }

    #[test]
    fn test_env_usize_default() {
        assert_eq!(env_usize("MOODLENS_TEST_UNSET_VARIABLE", 42), 42);
    }
}
