//! Content hashing for the cache layers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

/// A 128-bit XXH3 digest of file content, dependency sets, templates or config.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ContentHash(u128);

impl ContentHash {
    pub fn from_bytes(data: &[u8]) -> Self {
        ContentHash(xxhash_rust::xxh3::xxh3_128(data))
    }

    /// Stream a file through the hasher without loading it whole.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Xxh3::new();
        let mut buf = [0u8; 8192];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(ContentHash(hasher.digest128()))
    }

    /// Order-independent digest of a set of identifiers.
    ///
    /// The identifiers are sorted before hashing; an empty set hashes to the
    /// default (zero) value so "no dependencies" compares equal across runs.
    pub fn from_sorted_set<S: AsRef<str>>(items: &[S]) -> Self {
        if items.is_empty() {
            return ContentHash::default();
        }
        let mut sorted: Vec<&str> = items.iter().map(|s| s.as_ref()).collect();
        sorted.sort_unstable();
        let mut hasher = Xxh3::new();
        for item in sorted {
            hasher.update(item.as_bytes());
            hasher.update(b"\0");
        }
        ContentHash(hasher.digest128())
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}..)", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(
            ContentHash::from_bytes(b"package users"),
            ContentHash::from_bytes(b"package users")
        );
        assert_ne!(
            ContentHash::from_bytes(b"package users"),
            ContentHash::from_bytes(b"package profiles")
        );
    }

    #[test]
    fn test_file_hash_matches_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"func GET() {}").unwrap();
        file.flush().unwrap();

        let from_file = ContentHash::from_file(file.path()).unwrap();
        assert_eq!(from_file, ContentHash::from_bytes(b"func GET() {}"));
    }

    #[test]
    fn test_sorted_set_ignores_order() {
        let a = ContentHash::from_sorted_set(&["b.go", "a.go", "net/http"]);
        let b = ContentHash::from_sorted_set(&["net/http", "a.go", "b.go"]);
        assert_eq!(a, b);
        assert_ne!(a, ContentHash::from_sorted_set(&["a.go"]));
        assert_eq!(ContentHash::from_sorted_set::<&str>(&[]), ContentHash::default());
    }

    #[test]
    fn test_sorted_set_items_are_delimited() {
        assert_ne!(
            ContentHash::from_sorted_set(&["a|b"]),
            ContentHash::from_sorted_set(&["a", "b"])
        );
        assert_ne!(
            ContentHash::from_sorted_set(&["ab"]),
            ContentHash::from_sorted_set(&["a", "b"])
        );
    }

    #[test]
    fn test_display_is_32_hex_chars() {
        let h = ContentHash::from_bytes(b"route");
        let s = h.to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h.short().len(), 8);
    }
}
