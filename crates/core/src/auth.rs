//! Authentication token handed to the transport at connect time.

use std::fmt;

/// Opaque bearer token supplied by the session layer.
///
/// The feed adapter never persists or refreshes it; an empty token is
/// rejected before any connection is attempted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value, for the transport's auth header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Keep the secret out of logs.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

impl From<&str> for AuthToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_auth_token_debug_redacts() {
        let token = AuthToken::new("secret-bearer-token");
        assert_eq!(format!("{:?}", token), "AuthToken(***)");
    }

    #[test]
    fn test_auth_token_empty() {
        assert!(AuthToken::new("").is_empty());
        assert!(!AuthToken::new("t").is_empty());
    }
}
