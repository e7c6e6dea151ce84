//! Access token verification.
//!
//! When a [`TokenVerifier`] is configured every entry point checks the
//! request's access token before compiling anything. Without one, requests
//! are not authenticated.

use std::collections::HashSet;

use crate::error::{GraphError, GraphResult};

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, access_token: &str) -> bool;
}

/// Accepts a fixed set of tokens
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashSet<String>,
}

impl StaticTokenVerifier {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a comma-separated token list from `var`
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Configuration` when the variable is unset or holds no tokens.
    pub fn from_env(var: &str) -> GraphResult<Self> {
        let raw = std::env::var(var)
            .map_err(|e| GraphError::Configuration(format!("token list {var}: {e}")))?;
        let verifier = Self::new(
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty()),
        );
        if verifier.tokens.is_empty() {
            return Err(GraphError::Configuration(format!("token list {var} is empty")));
        }
        Ok(verifier)
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, access_token: &str) -> bool {
        self.tokens.contains(access_token)
    }
}

/// Gate a request on its access token
///
/// # Errors
///
/// Returns `GraphError::Authorization` when a verifier is configured and the
/// token is absent or rejected.
pub fn authorize(verifier: Option<&dyn TokenVerifier>, access_token: Option<&str>) -> GraphResult<()> {
    let Some(verifier) = verifier else {
        return Ok(());
    };
    match access_token.map(str::trim).filter(|t| !t.is_empty()) {
        None => Err(GraphError::Authorization("access token required".to_string())),
        Some(token) if verifier.verify(token) => Ok(()),
        Some(_) => Err(GraphError::Authorization("access token rejected".to_string())),
    }
}
