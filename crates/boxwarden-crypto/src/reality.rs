//! Reality key material.
//!
//! The tunnel binary prints a keypair as labelled lines:
//!
//! ```text
//! PrivateKey: <base64url>
//! PublicKey: <base64url>
//! ```
//!
//! That output is persisted verbatim the first time and re-read on every
//! later run, so the private key (and with it the clients' public key) stays
//! stable across restarts.

/// Short identifier shared by every deployment.
pub const SHORT_ID: &str = "01234567";

const PRIVATE_KEY_LABEL: &str = "privatekey";
const PUBLIC_KEY_LABEL: &str = "publickey";

/// Errors from key-material parsing.
#[derive(Debug, thiserror::Error)]
pub enum KeyMaterialError {
    #[error("Unexpected key material format: {0}")]
    FormatUnexpected(String),
}

/// Private key, optional public key and short id used by the Reality inbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealityKeyMaterial {
    pub private_key: String,
    pub public_key: Option<String>,
    pub short_id: String,
}

impl RealityKeyMaterial {
    fn new(private_key: String, public_key: Option<String>) -> Self {
        Self {
            private_key,
            public_key,
            short_id: SHORT_ID.to_string(),
        }
    }

    /// Parse the stdout of `generate reality-keypair`.
    ///
    /// Labels are matched ignoring case and whitespace, so both
    /// `PrivateKey:` and `Private key:` are accepted.
    pub fn from_keygen_output(output: &str) -> Result<Self, KeyMaterialError> {
        let mut private_key = None;
        let mut public_key = None;
        for (label, value) in output.lines().filter_map(split_labelled) {
            match label.as_str() {
                PRIVATE_KEY_LABEL if private_key.is_none() => private_key = Some(value),
                PUBLIC_KEY_LABEL if public_key.is_none() => public_key = Some(value),
                _ => {}
            }
        }
        let private_key = private_key.ok_or_else(|| {
            KeyMaterialError::FormatUnexpected("no private key line in keygen output".into())
        })?;
        Ok(Self::new(private_key, public_key))
    }

    /// Parse a persisted key file. The private key is the value on the first
    /// line (`label: value`); a public key line, if any, is picked up too.
    pub fn from_persisted(content: &str) -> Result<Self, KeyMaterialError> {
        let first = content
            .lines()
            .next()
            .ok_or_else(|| KeyMaterialError::FormatUnexpected("key file is empty".into()))?;
        let (_, private_key) = split_labelled(first).ok_or_else(|| {
            KeyMaterialError::FormatUnexpected(format!(
                "first line of key file is not `label: value`: {first:?}"
            ))
        })?;
        let public_key = content
            .lines()
            .skip(1)
            .filter_map(split_labelled)
            .find(|(label, _)| label == PUBLIC_KEY_LABEL)
            .map(|(_, value)| value);
        Ok(Self::new(private_key, public_key))
    }
}

/// Split `Label: value` into a normalised label and trimmed value.
/// Lines without a colon or with an empty value yield `None`.
fn split_labelled(line: &str) -> Option<(String, String)> {
    let (label, value) = line.split_once(':')?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let label = label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    Some((label, value.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_keygen_output() {
        let keys = RealityKeyMaterial::from_keygen_output(
            "PrivateKey: kPriv_123-abc\nPublicKey: kPub_456\n",
        )
        .unwrap();
        assert_eq!(keys.private_key, "kPriv_123-abc");
        assert_eq!(keys.public_key.as_deref(), Some("kPub_456"));
        assert_eq!(keys.short_id, SHORT_ID);
    }

    #[test]
    fn accepts_spaced_label_and_trailing_whitespace() {
        let keys =
            RealityKeyMaterial::from_keygen_output("Private key:   abc  \r\nPublic key: def\r\n")
                .unwrap();
        assert_eq!(keys.private_key, "abc");
        assert_eq!(keys.public_key.as_deref(), Some("def"));
    }

    #[test]
    fn missing_private_key_is_typed_error() {
        let err = RealityKeyMaterial::from_keygen_output("PublicKey: only\n").unwrap_err();
        assert!(matches!(err, KeyMaterialError::FormatUnexpected(_)));

        let err = RealityKeyMaterial::from_keygen_output("").unwrap_err();
        assert!(matches!(err, KeyMaterialError::FormatUnexpected(_)));
    }

    #[test]
    fn persisted_first_line_is_private_key() {
        let keys = RealityKeyMaterial::from_persisted("PrivateKey: ABC123\nPublicKey: XYZ\n").unwrap();
        assert_eq!(keys.private_key, "ABC123");
        assert_eq!(keys.public_key.as_deref(), Some("XYZ"));
    }

    #[test]
    fn persisted_without_public_key() {
        let keys = RealityKeyMaterial::from_persisted("Private key: ABC123").unwrap();
        assert_eq!(keys.private_key, "ABC123");
        assert!(keys.public_key.is_none());
    }

    #[test]
    fn persisted_garbage_is_rejected() {
        assert!(RealityKeyMaterial::from_persisted("").is_err());
        assert!(RealityKeyMaterial::from_persisted("no colon here\n").is_err());
        assert!(RealityKeyMaterial::from_persisted("PrivateKey:\n").is_err());
    }
}
