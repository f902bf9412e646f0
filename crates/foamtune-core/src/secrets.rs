//! Redacted storage for hub access tokens.

use std::fmt;

/// A string whose `Debug` and `Display` output never shows its content.
///
/// Hub tokens travel through configuration and tracing spans; wrapping
/// them here keeps them out of logs. Read the value with
/// [`expose_secret`](SecretString::expose_secret).
///
/// ```
/// use foamtune_core::SecretString;
///
/// let token = SecretString::new("hf_abc123");
/// assert_eq!(format!("{token:?}"), "SecretString([REDACTED])");
/// assert_eq!(token.expose_secret(), "hf_abc123");
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: secret.into(),
        }
    }

    /// Read a token from the environment, ignoring unset or blank values.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(Self::new)
    }

    /// Expose the secret value.
    #[inline]
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Check if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted_in_formatting() {
        let secret = SecretString::from("hf_token");
        assert_eq!(format!("{secret}"), "[REDACTED]");
        assert!(!format!("{:?}", Some(&secret)).contains("hf_token"));
    }

    #[test]
    fn test_from_env_skips_blank_values() {
        std::env::set_var("FOAMTUNE_TEST_BLANK_TOKEN", "  ");
        assert!(SecretString::from_env("FOAMTUNE_TEST_BLANK_TOKEN").is_none());
        assert!(SecretString::from_env("FOAMTUNE_TEST_UNSET_TOKEN").is_none());
    }
}
