//! Identity tokens and server-assigned timestamps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque per-user token, correlated 1:1 with a user row across reconnects.
///
/// A fixed-width binary value used only for equality comparison and display;
/// it is never parsed for meaning. Serialized as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; 16]);

impl Identity {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the token.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Errors from parsing an identity token out of its hex form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdentityError {
    #[error("expected 32 hex digits, got {0} characters")]
    Length(usize),
    #[error("invalid hex digit in identity token")]
    InvalidDigit,
}

impl FromStr for Identity {
    type Err = ParseIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.as_bytes();
        if digits.len() != 32 {
            return Err(ParseIdentityError::Length(digits.len()));
        }
        let mut bytes = [0u8; 16];
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            let hi = hex_value(pair[0]).ok_or(ParseIdentityError::InvalidDigit)?;
            let lo = hex_value(pair[1]).ok_or(ParseIdentityError::InvalidDigit)?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

impl Serialize for Identity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Milliseconds since the Unix epoch, assigned by the server at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse_round_trip() {
        let identity = Identity::generate();
        let hex = identity.to_string();
        assert_eq!(hex.len(), 32);
        assert_eq!(hex.parse::<Identity>().unwrap(), identity);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            "abc".parse::<Identity>(),
            Err(ParseIdentityError::Length(3))
        );
        assert_eq!(
            "zz000000000000000000000000000000".parse::<Identity>(),
            Err(ParseIdentityError::InvalidDigit)
        );
    }

    #[test]
    fn test_parse_accepts_uppercase() {
        let identity = Identity::from_bytes([0xAB; 16]);
        let upper = identity.to_string().to_uppercase();
        assert_eq!(upper.parse::<Identity>().unwrap(), identity);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let identity = Identity::from_bytes([0x01; 16]);
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(json, "\"01010101010101010101010101010101\"");
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);
    }

    #[test]
    fn test_generated_identities_are_distinct() {
        assert_ne!(Identity::generate(), Identity::generate());
    }
}
