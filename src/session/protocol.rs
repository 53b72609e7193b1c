//! Gemini Live `BidiGenerateContent` wire messages
//!
//! Only the fields this client sends or reacts to are modelled; anything
//! else in a server message is ignored.

use serde::{Deserialize, Serialize};

use crate::session::transport::{InboundFrame, OutboundFrame, SessionSetup};

/// First message on the socket, configuring the session
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Turn content: a list of parts
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

/// Base64 media payload with its MIME type
///
/// Inbound blobs without a MIME type are taken to be audio.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    fn is_audio(&self) -> bool {
        self.mime_type.is_empty() || self.mime_type.starts_with("audio/")
    }
}

/// Streaming microphone input
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

/// Any message the server may send
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

/// Server notice that the connection will be terminated soon
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl SetupMessage {
    /// Build the setup message for a session
    #[must_use]
    pub fn new(model: &str, setup: &SessionSetup) -> Self {
        let system_instruction = (!setup.profile.persona.trim().is_empty()).then(|| Content {
            parts: vec![Part {
                text: Some(setup.profile.persona.clone()),
                inline_data: None,
            }],
        });

        Self {
            setup: Setup {
                model: model.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: setup.profile.voice.name().to_string(),
                            },
                        },
                    },
                },
                system_instruction,
            },
        }
    }
}

impl From<OutboundFrame> for RealtimeInputMessage {
    fn from(frame: OutboundFrame) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![Blob {
                    mime_type: frame.mime_type,
                    data: frame.media_bytes,
                }],
            },
        }
    }
}

impl ServerMessage {
    /// Whether this message confirms the session setup
    #[must_use]
    pub const fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Split server content into inbound frames
    ///
    /// Each inline audio part becomes one frame; an interruption flag rides
    /// on the last frame (or a frame of its own when there is no audio).
    #[must_use]
    pub fn into_frames(self) -> Vec<InboundFrame> {
        let Some(content) = self.server_content else {
            return Vec::new();
        };

        let mut frames: Vec<InboundFrame> = content
            .model_turn
            .map(|turn| turn.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.inline_data)
            .filter(Blob::is_audio)
            .map(|blob| InboundFrame::audio(blob.data))
            .collect();

        if content.interrupted {
            match frames.last_mut() {
                Some(last) => last.interrupted = true,
                None => frames.push(InboundFrame::interruption()),
            }
        }

        frames
    }
}
