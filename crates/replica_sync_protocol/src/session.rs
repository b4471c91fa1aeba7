//! The session capability.

/// An authenticated session with the remote service.
///
/// The reconciler only asks whether the session is usable. Transports that
/// talk to a real service also read the authorization header value.
pub trait Session: Send + Sync {
    /// Returns true if the session's credentials pass validation.
    fn is_valid(&self) -> bool;

    /// Value for the `Authorization` header, if the transport needs one.
    fn authorization(&self) -> Option<String> {
        None
    }
}

/// A session with a fixed bearer token.
///
/// An empty token is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSession {
    token: String,
}

impl StaticSession {
    /// Creates a session carrying `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Session for StaticSession {
    fn is_valid(&self) -> bool {
        !self.token.trim().is_empty()
    }

    fn authorization(&self) -> Option<String> {
        self.is_valid().then(|| format!("Bearer {}", self.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_is_invalid() {
        assert!(!StaticSession::new("").is_valid());
        assert!(!StaticSession::new("   ").is_valid());
        assert_eq!(StaticSession::new("").authorization(), None);
    }

    #[test]
    fn bearer_header() {
        let session = StaticSession::new("abc");
        assert!(session.is_valid());
        assert_eq!(session.authorization().as_deref(), Some("Bearer abc"));
    }
}
