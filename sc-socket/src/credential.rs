//! Credential sources for the socket handshake.
//!
//! The token is read once per handshake. Rotating it does not affect a live
//! connection, only the next one.

use std::sync::{Arc, RwLock};

/// Supplies the bearer token sent with each handshake.
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` when the user is not signed in.
    fn current_token(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current_token(&self) -> Option<String> {
        self()
    }
}

/// A token fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// No credential; the handshake carries an empty token.
    pub fn none() -> Self {
        Self { token: None }
    }

    /// Treat an empty string (e.g. an unset config field) as no credential.
    pub fn from_config(token: &str) -> Self {
        if token.is_empty() {
            Self::none()
        } else {
            Self::new(token)
        }
    }
}

impl CredentialProvider for StaticCredential {
    fn current_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// A token the application can swap out between connections (sign-in, refresh).
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    token: Arc<RwLock<Option<String>>>,
}

impl SharedCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl CredentialProvider for SharedCredential {
    fn current_token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credential() {
        assert_eq!(StaticCredential::new("t").current_token().as_deref(), Some("t"));
        assert_eq!(StaticCredential::none().current_token(), None);
        assert_eq!(StaticCredential::from_config("").current_token(), None);
    }

    #[test]
    fn test_shared_credential_rotation() {
        let cred = SharedCredential::new();
        let reader = cred.clone();
        assert_eq!(reader.current_token(), None);

        cred.set("first");
        assert_eq!(reader.current_token().as_deref(), Some("first"));
        cred.set("second");
        assert_eq!(reader.current_token().as_deref(), Some("second"));
        cred.clear();
        assert_eq!(reader.current_token(), None);
    }

    #[test]
    fn test_closure_credential() {
        let provider = || Some("from-closure".to_string());
        assert_eq!(provider.current_token().as_deref(), Some("from-closure"));
    }
}
