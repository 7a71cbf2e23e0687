use sha2::{Digest, Sha256};

/// First 8 bytes (big endian) of the SHA-256 of the concatenated parts.
///
/// Used wherever a run must be reproducible: combination ranks and the
/// penalty perturbation seeds.
pub(crate) fn sha256_prefix(parts: &[&str]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_stable_and_concatenating() {
        assert_eq!(sha256_prefix(&["ab", "c"]), sha256_prefix(&["abc"]));
        assert_ne!(sha256_prefix(&["abc"]), sha256_prefix(&["abd"]));
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(sha256_prefix(&["abc"]), 0xba7816bf8f01cfea);
    }
}
