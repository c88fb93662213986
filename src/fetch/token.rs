//! Session token sources.
//!
//! The session token is whatever the host environment hands us; the
//! service key for the open endpoint lives in configuration instead.

use tracing::debug;

pub trait SessionTokenSource: Send + Sync {
    fn session_token(&self) -> Option<String>;
}

/// Reads the session token from an environment variable on every call, so a
/// token refreshed by the host is picked up without restarting.
#[derive(Debug, Clone)]
pub struct EnvTokenSource {
    var: String,
}

impl EnvTokenSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl SessionTokenSource for EnvTokenSource {
    fn session_token(&self) -> Option<String> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Some(token.trim().to_string()),
            _ => {
                debug!("No session token in {}", self.var);
                None
            }
        }
    }
}

/// Fixed token (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl SessionTokenSource for StaticToken {
    fn session_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_token_source_missing_var() {
        let source = EnvTokenSource::new("MATCHROOM_LENS_TEST_TOKEN_THAT_IS_NOT_SET");
        assert_eq!(source.session_token(), None);
    }

    #[test]
    fn test_static_token() {
        assert_eq!(
            StaticToken(Some("abc".to_string())).session_token(),
            Some("abc".to_string())
        );
        assert_eq!(StaticToken::default().session_token(), None);
    }
}
