//! Deterministic test payloads.

use rand::{Rng, SeedableRng, distributions::Alphanumeric, rngs::StdRng};

/// `len` pseudo-random alphanumeric characters derived from `seed`.
#[must_use]
pub fn random_text(len: usize, seed: u64) -> String {
    StdRng::seed_from_u64(seed)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `count` distinct messages formatted as `"{prefix} #{i}"`.
///
/// ```
/// use framechain_testing::sequential_messages;
///
/// assert_eq!(sequential_messages("Hello world", 2), ["Hello world #0", "Hello world #1"]);
/// ```
#[must_use]
pub fn sequential_messages(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix} #{i}")).collect()
}
