//! Transient-failure classification for engine stderr.

const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "temporar",
    "throttl",
    "rate",
    "429",
    "econnreset",
    "etimedout",
];

/// A run is worth retrying only when stderr carries one of the known
/// transient signatures. Anything else is treated as deterministic.
pub fn is_transient(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| stderr.contains(p))
}
