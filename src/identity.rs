//! Caller identity for attributed writes.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use crate::limits::MAX_OWNER_ID_LEN;
use crate::model::OwnerId;

/// Resolves a presented credential into the caller's identity.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<OwnerId>;
}

/// Static bearer tokens mapped to owners, e.g. `{"s3cret": "alice"}`.
#[derive(Debug, Default)]
pub struct TokenIdentity {
    tokens: HashMap<String, OwnerId>,
}

impl TokenIdentity {
    pub fn new(tokens: HashMap<String, OwnerId>) -> Self {
        Self { tokens }
    }

    pub fn from_json(json: &str) -> io::Result<Self> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let mut tokens = HashMap::with_capacity(raw.len());
        for (token, owner) in raw {
            if token.is_empty() || owner.trim().is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "empty token or owner in token file",
                ));
            }
            if owner.len() > MAX_OWNER_ID_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("owner id too long: {owner}"),
                ));
            }
            tokens.insert(token, OwnerId::new(owner));
        }
        Ok(Self { tokens })
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityProvider for TokenIdentity {
    fn resolve(&self, credential: &str) -> Option<OwnerId> {
        self.tokens.get(credential).cloned()
    }
}
