//! Developer key generator.

use std::ops::RangeInclusive;

use rand::Rng;

/// Smallest developer key handed out.
pub const DEV_KEY_MIN: i32 = 100_000;
/// Largest developer key handed out.
pub const DEV_KEY_MAX: i32 = 999_999;

/// Draws candidate developer keys.
pub struct DevKeyGenerator;

impl DevKeyGenerator {
    /// The key space, `[100000, 999999]`.
    pub fn range() -> RangeInclusive<i32> {
        DEV_KEY_MIN..=DEV_KEY_MAX
    }

    /// Draws a key uniformly at random from the key space.
    ///
    /// Uniqueness is not checked here; callers test the candidate against
    /// the `devs` table and draw again on collision.
    pub fn candidate() -> i32 {
        rand::thread_rng().gen_range(Self::range())
    }

    /// Whether `key` lies in the key space.
    pub fn is_valid(key: i32) -> bool {
        Self::range().contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_stay_in_range() {
        for _ in 0..10_000 {
            assert!(DevKeyGenerator::is_valid(DevKeyGenerator::candidate()));
        }
    }

    #[test]
    fn test_range_bounds() {
        assert!(DevKeyGenerator::is_valid(100_000));
        assert!(DevKeyGenerator::is_valid(999_999));
        assert!(!DevKeyGenerator::is_valid(99_999));
        assert!(!DevKeyGenerator::is_valid(1_000_000));
    }
}
