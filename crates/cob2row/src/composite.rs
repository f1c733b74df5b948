//! Composite binding identifiers.
//!
//! A composite identifier pairs a binding's logical name with the artifact
//! that provides it, written `identifier[artifact]`. The string form is
//! persisted in pipeline configuration, so the delimiters are a durable
//! format.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Cob2RowError, Result};

const OPEN: char = '[';
const CLOSE: char = ']';

/// Encodes `identifier` and `artifact` as `identifier[artifact]`.
///
/// No escaping happens; `identifier` must not contain `[` or `]`.
pub fn encode(identifier: &str, artifact: &str) -> String {
    format!("{identifier}{OPEN}{artifact}{CLOSE}")
}

/// Returns the logical identifier part of a token.
///
/// A token without an artifact suffix is returned whole.
pub fn decode_identifier(token: &str) -> &str {
    match split_index(token) {
        Some(i) => &token[..i],
        None => token,
    }
}

/// Returns the artifact part of a token, if there is one.
pub fn decode_artifact(token: &str) -> Option<&str> {
    let i = split_index(token)?;
    token[i + OPEN.len_utf8()..].strip_suffix(CLOSE)
}

// A leading `[` leaves no identifier to pair with, so such tokens are bare.
fn split_index(token: &str) -> Option<usize> {
    token.find(OPEN).filter(|i| *i > 0)
}

/// Parsed form of a composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct CompositeIdentifier {
    identifier: String,
    artifact: Option<String>,
}

impl CompositeIdentifier {
    pub fn new(identifier: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            artifact: Some(artifact.into()),
        }
    }

    /// Like [`CompositeIdentifier::new`] but rejects identifiers that would
    /// not survive a round trip through the string form.
    pub fn checked(identifier: &str, artifact: &str) -> Result<Self> {
        if identifier.is_empty() || identifier.contains([OPEN, CLOSE]) {
            return Err(Cob2RowError::configuration(format!(
                "binding identifier {identifier:?} must be non-empty and free of '{OPEN}' and '{CLOSE}'"
            )));
        }
        Ok(Self::new(identifier, artifact))
    }

    /// An identifier resolved without any artifact, such as a binding
    /// compiled into the host.
    pub fn bare(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            artifact: None,
        }
    }

    pub fn parse(token: &str) -> Self {
        Self {
            identifier: decode_identifier(token).to_string(),
            artifact: decode_artifact(token).map(str::to_string),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn artifact(&self) -> Option<&str> {
        self.artifact.as_deref()
    }
}

impl fmt::Display for CompositeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.artifact {
            Some(artifact) => f.write_str(&encode(&self.identifier, artifact)),
            None => f.write_str(&self.identifier),
        }
    }
}

impl FromStr for CompositeIdentifier {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for CompositeIdentifier {
    fn from(token: String) -> Self {
        Self::parse(&token)
    }
}

impl From<CompositeIdentifier> for String {
    fn from(id: CompositeIdentifier) -> Self {
        id.to_string()
    }
}
