//! Voice selection and persona text for a session

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::Error;

/// Prebuilt voices offered by the realtime model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Voice {
    Puck,
    Charon,
    #[default]
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    Zephyr,
}

impl Voice {
    /// Every supported voice
    pub const ALL: [Self; 8] = [
        Self::Puck,
        Self::Charon,
        Self::Kore,
        Self::Fenrir,
        Self::Aoede,
        Self::Leda,
        Self::Orus,
        Self::Zephyr,
    ];

    /// Name sent in the session setup
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Zephyr => "Zephyr",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Voice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::Config(format!("unknown voice: {wanted}")))
    }
}

/// Persona text and voice used when opening a session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionProfile {
    /// Free-form system instruction text
    pub persona: String,
    /// Voice for synthesized speech
    pub voice: Voice,
}

/// Shared, mutable session profile
///
/// Readers always see the latest value at the time they read it, so
/// long-lived handlers never act on a stale copy captured earlier.
#[derive(Debug, Clone, Default)]
pub struct ProfileCell(Arc<RwLock<SessionProfile>>);

impl ProfileCell {
    /// Create a cell holding `profile`
    #[must_use]
    pub fn new(profile: SessionProfile) -> Self {
        Self(Arc::new(RwLock::new(profile)))
    }

    /// Current profile
    #[must_use]
    pub fn get(&self) -> SessionProfile {
        self.0
            .read()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Replace the voice
    pub fn set_voice(&self, voice: Voice) {
        self.update(|p| p.voice = voice);
    }

    /// Replace the persona text
    pub fn set_persona(&self, persona: impl Into<String>) {
        let persona = persona.into();
        self.update(|p| p.persona = persona);
    }

    fn update(&self, f: impl FnOnce(&mut SessionProfile)) {
        match self.0.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_parse_case_insensitive() {
        assert_eq!("puck".parse::<Voice>().unwrap(), Voice::Puck);
        assert_eq!(" ZEPHYR ".parse::<Voice>().unwrap(), Voice::Zephyr);
        assert!("alloy".parse::<Voice>().is_err());
    }

    #[test]
    fn test_voice_display_roundtrip() {
        for voice in Voice::ALL {
            assert_eq!(voice.to_string().parse::<Voice>().unwrap(), voice);
        }
    }

    #[test]
    fn test_profile_cell_reads_latest() {
        let cell = ProfileCell::new(SessionProfile::default());
        let reader = cell.clone();

        cell.set_voice(Voice::Puck);
        cell.set_persona("You are a cheerful snowman.");

        let profile = reader.get();
        assert_eq!(profile.voice, Voice::Puck);
        assert_eq!(profile.persona, "You are a cheerful snowman.");
    }
}
