use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Hex digits of a fingerprint shown in logs and text reports.
const SHORT_LEN: usize = 12;

/// Lowercase hex SHA-256 of the uploaded document. Identifies a statement without keeping
/// its bytes.
pub fn fingerprint(document: &[u8]) -> String {
    Sha256::digest(document)
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

/// Leading digits of a fingerprint, for display.
pub fn short(fingerprint: &str) -> &str {
    fingerprint.get(..SHORT_LEN).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &[u8] = include_bytes!("../../pdf/tests/fixtures/statement.pdf");
    const ENCRYPTED: &[u8] = include_bytes!("../../pdf/tests/fixtures/statement-encrypted.pdf");

    #[test]
    fn empty_document_digest() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn statement_fingerprint_is_stable_hex() {
        let hex = fingerprint(FIXTURE);
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_eq!(hex, fingerprint(FIXTURE));
        // Same statement, different encryption: a different document.
        assert_ne!(hex, fingerprint(ENCRYPTED));
    }

    #[test]
    fn one_byte_changes_the_fingerprint() {
        let mut edited = FIXTURE.to_vec();
        let last = edited.len() - 1;
        edited[last] ^= 1;
        assert_ne!(fingerprint(&edited), fingerprint(FIXTURE));
    }

    #[test]
    fn short_form() {
        let hex = fingerprint(b"%PDF-1.4");
        assert_eq!(short(&hex), &hex[..12]);
        assert_eq!(short("abc"), "abc");
    }
}
