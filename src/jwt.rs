use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use log::{debug, trace};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unpadded base64url; tolerates non-zero trailing bits like most JWT libraries.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Payload,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Header => f.write_str("header"),
            Segment::Payload => f.write_str("payload"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("JWT is malformed: expected 3 segments, found {0}")]
    JwtMalformed(usize),
    #[error("Invalid base64 in {segment}")]
    InvalidBase64 {
        segment: Segment,
        source: base64::DecodeError,
    },
    #[error("Invalid UTF-8 in {segment}")]
    InvalidUtf8 {
        segment: Segment,
        source: std::string::FromUtf8Error,
    },
    #[error("Invalid {segment}, expected a JSON object")]
    InvalidJson {
        segment: Segment,
        source: serde_json::Error,
    },
    #[error("Failed to serialize decoded token")]
    Serialize(#[source] serde_json::Error),
}

/// Header parameters in the order they appear in the token.
pub type Header = Map<String, Value>;

/// Claims in the order they appear in the token.
pub type Claims = Map<String, Value>;

/// The third segment, kept as text. It is neither decoded nor verified.
pub struct Signature {
    pub encoded: String,
}

pub struct Jwt {
    pub header: Header,
    pub claims: Claims,
    pub signature: Signature,
}

#[derive(Serialize)]
struct DecodedToken<'a> {
    #[serde(rename = "Header")]
    header: &'a Header,
    #[serde(rename = "Body")]
    body: &'a Claims,
}

impl Jwt {
    /// Renders `{"Header": ..., "Body": ...}` with two-space indentation.
    pub fn to_pretty_json(&self) -> Result<String, Error> {
        let decoded = DecodedToken {
            header: &self.header,
            body: &self.claims,
        };
        serde_json::to_string_pretty(&decoded).map_err(Error::Serialize)
    }
}

fn decode_segment(segment: Segment, encoded: &str) -> Result<Vec<u8>, Error> {
    SEGMENT_ENGINE
        .decode(encoded.as_bytes())
        .map_err(|source| Error::InvalidBase64 { segment, source })
}

fn decode_object(segment: Segment, encoded: &str) -> Result<Map<String, Value>, Error> {
    let decoded = decode_segment(segment, encoded)?;
    let json =
        String::from_utf8(decoded).map_err(|source| Error::InvalidUtf8 { segment, source })?;
    trace!("{} json: {}", segment, json);
    serde_json::from_str(&json).map_err(|source| Error::InvalidJson { segment, source })
}

impl FromStr for Jwt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();

        if parts.len() != 3 {
            return Err(Error::JwtMalformed(parts.len()));
        }

        let (header, payload, signature) = (parts[0], parts[1], parts[2]);

        let header = decode_object(Segment::Header, header)?;
        let claims = decode_object(Segment::Payload, payload)?;

        debug!(
            "decoded {} header parameter(s), {} claim(s), {} signature character(s) left unverified",
            header.len(),
            claims.len(),
            signature.len()
        );

        Ok(Jwt {
            header,
            claims,
            signature: Signature {
                encoded: signature.to_string(),
            },
        })
    }
}
