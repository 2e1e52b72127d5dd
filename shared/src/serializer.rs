use std::str::FromStr;

use thiserror::Error;

use crate::envelope::Envelope;

/// Wire encoding scheme, selected once at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    /// Textual JSON; the payload is a string.
    #[default]
    Json,
    /// The same logical content, UTF-8 encoded into an opaque byte buffer.
    BinaryMin,
}

/// An unknown scheme name is a fatal configuration error, surfaced where the
/// configuration is parsed rather than at send time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown serialization scheme `{0}`")]
pub struct SchemeParseError(pub String);

impl FromStr for Scheme {
    type Err = SchemeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Scheme::Json),
            "binary-min" => Ok(Scheme::BinaryMin),
            other => Err(SchemeParseError(other.to_string())),
        }
    }
}

/// An encoded envelope ready for a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl WirePayload {
    pub fn len(&self) -> usize {
        match self {
            WirePayload::Text(text) => text.len(),
            WirePayload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors raised while encoding or decoding envelopes. Callers on the receive
/// path convert these into silent drops.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("envelope encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("envelope decode failed: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("binary payload is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Encodes and decodes [`Envelope`]s for one of the two wire schemes.
/// Decoding is a total inverse of encoding for valid inputs.
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    scheme: Scheme,
}

impl Serializer {
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn encode(&self, envelope: &Envelope) -> Result<WirePayload, CodecError> {
        let text = serde_json::to_string(envelope).map_err(CodecError::Encode)?;
        Ok(match self.scheme {
            Scheme::Json => WirePayload::Text(text),
            Scheme::BinaryMin => WirePayload::Binary(text.into_bytes()),
        })
    }

    /// Decodes a payload regardless of which channel form it arrived in.
    /// Both schemes accept both forms, so a remote running the other scheme
    /// still interoperates.
    pub fn decode(&self, payload: &WirePayload) -> Result<Envelope, CodecError> {
        match payload {
            WirePayload::Text(text) => self.decode_text(text),
            WirePayload::Binary(bytes) => self.decode_binary(bytes),
        }
    }

    pub fn decode_text(&self, text: &str) -> Result<Envelope, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Decode)
    }

    pub fn decode_binary(&self, bytes: &[u8]) -> Result<Envelope, CodecError> {
        let text = std::str::from_utf8(bytes)?;
        self.decode_text(text)
    }
}
