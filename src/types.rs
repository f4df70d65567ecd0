//! Core types shared across the token-sentinel investigation pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A public key or token address in its textual (base58) form.
pub type Pubkey = String;

/// Minimum accepted length of a token address.
pub const MIN_ADDRESS_LEN: usize = 8;
/// Maximum accepted length of a token address.
pub const MAX_ADDRESS_LEN: usize = 128;

/// A token address that passed the structural format check.
///
/// Construction through [`TokenAddress::parse`] is the only way to obtain one,
/// so anything holding a `TokenAddress` never carries malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAddress(String);

impl TokenAddress {
    /// Normalize (trim) and validate a raw address string.
    ///
    /// Returns `None` when the trimmed address is empty, shorter than
    /// [`MIN_ADDRESS_LEN`], longer than [`MAX_ADDRESS_LEN`], or contains
    /// whitespace or control characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if !(MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&len) {
            return None;
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Three-valued risk bucket published with every investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Safe,
    Caution,
    Danger,
}

impl Verdict {
    /// Bucket a published trust score: Safe >= 70, Caution >= 40, Danger otherwise.
    pub fn from_score(score: u8) -> Self {
        match score {
            70..=u8::MAX => Verdict::Safe,
            40..=69 => Verdict::Caution,
            _ => Verdict::Danger,
        }
    }

    /// Parse a verdict label case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "SAFE" => Some(Verdict::Safe),
            "CAUTION" => Some(Verdict::Caution),
            "DANGER" => Some(Verdict::Danger),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Safe => "SAFE",
            Verdict::Caution => "CAUTION",
            Verdict::Danger => "DANGER",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether captured website imagery reuses a known template or stolen assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualReuse {
    Yes,
    No,
    Unknown,
}

impl VisualReuse {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "YES" | "TRUE" => Some(VisualReuse::Yes),
            "NO" | "FALSE" => Some(VisualReuse::No),
            "UNKNOWN" | "UNSURE" => Some(VisualReuse::Unknown),
            _ => None,
        }
    }
}
