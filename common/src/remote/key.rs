//! Syntax checks for PEM private keys.
//!
//! libssh2 only looks at the key once the connection is up, so malformed credentials are caught
//! here first and never cause a connection attempt.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error as ThisError;

const BEGIN_PREFIX: &str = "-----BEGIN ";
const ARMOR_SUFFIX: &str = "PRIVATE KEY-----";

/// Reasons a key is rejected before use.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum KeyParseError {
    #[error("key material is empty")]
    Empty,
    #[error("missing PEM private key header")]
    MissingHeader,
    #[error("missing PEM footer for {0}")]
    MissingFooter(String),
    #[error("key body is empty")]
    EmptyBody,
    #[error("key body is not valid base64")]
    InvalidBody,
}

/// What was learned from a syntactically valid key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeyInfo {
    /// Armor label, e.g. `OPENSSH PRIVATE KEY` or `RSA PRIVATE KEY`.
    pub label: String,
    /// Whether the legacy PEM headers mark the key as passphrase protected.
    pub encrypted: bool,
}

/// Checks that `material` is a PEM armoured private key with a base64 body.
///
/// # Errors
///
/// Returns a [`KeyParseError`] describing the first structural problem found.
pub fn parse_private_key(material: &str) -> Result<PrivateKeyInfo, KeyParseError> {
    let material = material.trim();
    if material.is_empty() {
        return Err(KeyParseError::Empty);
    }

    let mut lines = material.lines().map(str::trim);
    let label = lines
        .by_ref()
        .find_map(|line| {
            line.strip_prefix(BEGIN_PREFIX)
                .filter(|rest| rest.ends_with(ARMOR_SUFFIX))
                .and_then(|rest| rest.strip_suffix("-----"))
        })
        .ok_or(KeyParseError::MissingHeader)?
        .to_string();
    let footer = format!("-----END {label}-----");

    let mut body = String::new();
    let mut encrypted = false;
    let mut closed = false;
    for line in lines {
        if line == footer {
            closed = true;
            break;
        }
        // RFC 1421 style headers, e.g. `Proc-Type: 4,ENCRYPTED`
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("Proc-Type") && value.contains("ENCRYPTED") {
                encrypted = true;
            }
            continue;
        }
        body.push_str(line);
    }

    if !closed {
        return Err(KeyParseError::MissingFooter(label));
    }
    if body.is_empty() {
        return Err(KeyParseError::EmptyBody);
    }
    let decoded = STANDARD
        .decode(body.as_bytes())
        .map_err(|_| KeyParseError::InvalidBody)?;
    if decoded.is_empty() {
        return Err(KeyParseError::EmptyBody);
    }

    Ok(PrivateKeyInfo { label, encrypted })
}
