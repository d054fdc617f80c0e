use sha1::{Digest as _, Sha1};
use std::fmt;

/// Lowercase hex SHA-1 of a string. Node identities and key positions are
/// both expressed as a `Digest`, and ordered lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn digest(input: &str) -> Digest {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    Digest(hex::encode(hasher.finalize()))
}
