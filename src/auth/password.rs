pub use bcrypt::{BcryptError, DEFAULT_COST};

/// Hash a password with bcrypt at the given work factor (4..=31)
pub fn hash_password(password: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(password, cost)
}

/// Check a password against a stored bcrypt hash. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::debug!("Unverifiable password hash: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 4;

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let first = hash_password("Admin@1234", FAST).unwrap();
        let second = hash_password("Admin@1234", FAST).unwrap();
        assert!(first.starts_with("$2"));
        assert_ne!(first, second);
        assert!(verify_password("Admin@1234", &first));
        assert!(verify_password("Admin@1234", &second));
        assert!(!verify_password("admin@1234", &first));
    }

    #[test]
    fn cost_is_recorded_in_the_hash() {
        let hash = hash_password("Admin@1234", FAST).unwrap();
        assert!(hash.contains("$04$"));
        assert!(hash_password("Admin@1234", 3).is_err());
    }

    #[test]
    fn malformed_hashes_never_match() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "plaintext"));
        assert!(!verify_password("x", "sha256$salt$abc"));
    }
}
