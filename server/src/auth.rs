//! Identity resolution seam.
//!
//! Players authenticate out of band (the account backend with its OAuth/2FA
//! flows is an external collaborator). What reaches this service is an opaque
//! session token, carried as a `session` cookie or bearer token. The
//! [`SessionVerifier`] trait turns that token into a [`PlayerIdentity`] before
//! the WebSocket upgrade completes and before any HTTP handler runs.
//!
//! [`StaticTokenVerifier`] is the in-process implementation used by the
//! development binary and the tests; a deployment wires in an implementation
//! that consults the identity service instead.

use std::collections::HashMap;

/// Resolved player identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub id: String,
    pub username: String,
}

impl PlayerIdentity {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Maps opaque session tokens to player identities.
pub trait SessionVerifier: Send + Sync {
    /// Returns the identity for `token`, or `None` if the token is unknown,
    /// expired, or malformed.
    fn resolve(&self, token: &str) -> Option<PlayerIdentity>;
}

/// Fixed token table.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, PlayerIdentity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: PlayerIdentity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Builds a verifier from `token:id:username` entries, skipping malformed
    /// ones with a warning.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        let mut verifier = Self::new();
        for entry in entries {
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(token), Some(id), Some(username))
                    if !token.is_empty() && !id.is_empty() && !username.is_empty() =>
                {
                    verifier.insert(token, PlayerIdentity::new(id, username));
                }
                _ => log::warn!("Ignoring malformed session token entry: {}", entry),
            }
        }
        verifier
    }
}

impl SessionVerifier for StaticTokenVerifier {
    fn resolve(&self, token: &str) -> Option<PlayerIdentity> {
        self.tokens.get(token).cloned()
    }
}

/// Extracts the `session` cookie value from a `Cookie` header.
pub fn token_from_cookie_header(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name == "session").then(|| value.to_string())
    })
}
