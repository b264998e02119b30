use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// An opaque identity token correlating records with the caller that created
/// them.
///
/// The token is supplied by the client (a cookie value in practice) and has no
/// cryptographic binding. It is used for listing and delete authorization
/// only, never for authentication.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wraps a caller-supplied token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Creates a fresh random identity for anonymous callers.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Resolves an optional caller token, generating a fresh identity when
    /// the caller is anonymous (no token, or an empty one).
    pub fn or_generate(token: Option<OwnerId>) -> Self {
        match token {
            Some(owner) if !owner.is_anonymous() => owner,
            _ => Self::generate(),
        }
    }

    /// An empty token denotes an anonymous caller.
    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(OwnerId::generate(), OwnerId::generate());
    }

    #[test]
    fn or_generate_keeps_supplied_token() {
        let owner = OwnerId::new("alice");
        assert_eq!(OwnerId::or_generate(Some(owner.clone())), owner);
    }

    #[test]
    fn or_generate_replaces_anonymous_token() {
        let generated = OwnerId::or_generate(Some(OwnerId::new("")));
        assert!(!generated.is_anonymous());

        let generated = OwnerId::or_generate(None);
        assert!(!generated.is_anonymous());
    }
}
