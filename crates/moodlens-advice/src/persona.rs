use std::fmt;

/// Voice used when asking the text generator for advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persona {
    #[default]
    Friend,
    Professional,
    Roaster,
    Strict,
    Poet,
}

impl Persona {
    pub const ALL: [Persona; 5] = [
        Persona::Friend,
        Persona::Professional,
        Persona::Roaster,
        Persona::Strict,
        Persona::Poet,
    ];

    /// Exact role name match; anything else is a `Friend`.
    pub fn from_role(role: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == role)
            .unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Persona::Friend => "Friend",
            Persona::Professional => "Professional",
            Persona::Roaster => "Roaster",
            Persona::Strict => "Strict",
            Persona::Poet => "Poet",
        }
    }

    pub fn prompt(self, mood: &str) -> String {
        match self {
            Persona::Friend => format!(
                "You are a supportive college project partner. User is feeling {mood}. \
                 Speak in decent Hinglish. Be sensible but warm. \
                 Give advice like 'Thoda break lele' or 'Talk to someone'. \
                 End with a Song Recommendation matching {mood} mood. \
                 STRICT INSTRUCTION: Keep the response short and concise. \
                 Do NOT add unnecessary empty lines or huge gaps."
            ),
            Persona::Professional => format!(
                "You are a calm Indian Career Counselor. User is feeling {mood}. \
                 Speak in professional English with a warm tone. \
                 Focus on mental balance and productivity. \
                 End with a calm instrumental/lofi track name. \
                 STRICT INSTRUCTION: Keep the text compact. No extra line breaks between sentences."
            ),
            Persona::Roaster => format!(
                "You are a witty and sarcastic friend. User is feeling {mood}. \
                 Tease them lightly about their expression using smart humor. \
                 End by sarcastically suggesting a song that mocks their mood. \
                 STRICT INSTRUCTION: Keep it punchy and short. \
                 Do not waste token space with empty lines."
            ),
            Persona::Strict => format!(
                "You are a focused Mentor. User is feeling {mood}. \
                 Be firm. Push them to get back to work immediately. \
                 End with a High-Energy Song recommendation. \
                 STRICT INSTRUCTION: Be direct and to the point. No filler text or extra spaces."
            ),
            Persona::Poet => format!(
                "You are a Poet. User is feeling {mood}. \
                 Write strictly only 2 lines of Shayari in Roman Hindi. \
                 Do NOT add any explanation or context. \
                 Immediately after the Shayari, just add: 'Bas yaad rakh, mast rehne ka!'. \
                 STRICT INSTRUCTION: Do not add any extra newlines. Keep the format very tight."
            ),
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
