//! Utility functions for getting hashes
use std::format;
use std::hash::{DefaultHasher, Hash, Hasher};

pub(crate) fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

pub(crate) fn hash_as_hex_string<T: Hash>(t: &T) -> String {
    format!("{:x}", calculate_hash(t))
}

/// Fingerprint a float by its bit pattern, `-0.0` is folded into `0.0`
pub(crate) fn float_key(value: f64) -> u64 {
    if value == 0. {
        0f64.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod hashing_tests {
    use super::*;

    #[test]
    fn stable_within_process() {
        let a = hash_as_hex_string(&("A", float_key(0.6)));
        let b = hash_as_hex_string(&("A", float_key(0.6)));
        assert_eq!(a, b);
        assert_ne!(a, hash_as_hex_string(&("A", float_key(0.4))));
        assert_eq!(float_key(-0.), float_key(0.));
    }
}
