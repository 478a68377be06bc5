//! Content fingerprinting for change detection.

use sha2::{Digest, Sha256};

/// SHA-256 over the UTF-8 bytes of extracted text, hex-encoded.
///
/// Used purely for equality comparison, never decoded back to content.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        assert_eq!(fingerprint("sale starts 3/7"), fingerprint("sale starts 3/7"));
    }

    #[test]
    fn distinct_for_different_input() {
        assert_ne!(fingerprint("content a"), fingerprint("content b"));
        assert_ne!(fingerprint("content"), fingerprint("content "));
    }

    #[test]
    fn no_collisions_across_many_inputs() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..512 {
            assert!(seen.insert(fingerprint(&format!("content {i}"))));
        }
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
