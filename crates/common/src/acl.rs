//! Privileged-key access list.
//!
//! The ministry keys that may approve or reject institutions are published
//! out of band as a plain-text file, one key per line. The list is loaded
//! once at startup into an immutable [`PrivilegedKeys`] value and passed to
//! the queries that need it.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use thiserror::Error;

use crate::PublicKey;

/// Errors raised while loading the privileged-key list.
#[derive(Debug, Error)]
pub enum AclError {
    #[error("failed to read privileged key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("privileged key file is empty")]
    Empty,
}

/// An immutable set of ministry public keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedKeys {
    keys: HashSet<PublicKey>,
}

impl PrivilegedKeys {
    /// Builds the set from an explicit list of keys.
    pub fn new(keys: impl IntoIterator<Item = PublicKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Loads the set from a plain-text file, one key per line.
    ///
    /// Blank lines and lines starting with `#` are ignored.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AclError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Loads the set from any line-oriented reader.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, AclError> {
        let mut keys = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            keys.insert(PublicKey::new(line));
        }
        if keys.is_empty() {
            return Err(AclError::Empty);
        }
        Ok(Self { keys })
    }

    /// Returns true if `key` belongs to a ministry.
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.contains(key)
    }

    /// Iterates over the keys in the set.
    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys.iter()
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_keys_skipping_comments_and_blanks() {
        let input = "# ministry keys\n02aaaa\n\n02bbbb\n";
        let acl = PrivilegedKeys::from_reader(input.as_bytes()).unwrap();
        assert_eq!(acl.len(), 2);
        assert!(acl.contains(&PublicKey::new("02aaaa")));
        assert!(acl.contains(&PublicKey::new("02bbbb")));
        assert!(!acl.contains(&PublicKey::new("02cccc")));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let input = "  02aaaa  \n";
        let acl = PrivilegedKeys::from_reader(input.as_bytes()).unwrap();
        assert!(acl.contains(&PublicKey::new("02aaaa")));
    }

    #[test]
    fn empty_file_is_an_error() {
        let input = "# only comments\n\n";
        assert!(matches!(
            PrivilegedKeys::from_reader(input.as_bytes()),
            Err(AclError::Empty)
        ));
    }

    #[test]
    fn duplicate_keys_collapse() {
        let input = "02aaaa\n02aaaa\n";
        let acl = PrivilegedKeys::from_reader(input.as_bytes()).unwrap();
        assert_eq!(acl.len(), 1);
    }
}
