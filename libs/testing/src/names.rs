//! Random resource names.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Random lowercase ASCII letters.
pub fn gen_alpha(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect()
}

/// Random lowercase ASCII letters and digits.
pub fn gen_alphanumeric(len: usize) -> String {
    Alphanumeric
        .sample_string(&mut rand::rng(), len)
        .to_ascii_lowercase()
}

/// `{prefix}-{8 random alphanumerics}`.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", gen_alphanumeric(8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_is_letters_only() {
        let s = gen_alpha(12);
        assert_eq!(s.len(), 12);
        assert!(s.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn alphanumeric_has_requested_length() {
        let s = gen_alphanumeric(8);
        assert_eq!(s.len(), 8);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn unique_names_differ() {
        let a = unique_name("test-ssa");
        let b = unique_name("test-ssa");
        assert!(a.starts_with("test-ssa-"));
        assert_ne!(a, b);
    }
}
