//! Shared guardrails for query payload bounds and result limits.

pub const MAX_QUERY_LENGTH: usize = 256;
pub const MAX_RESULT_LIMIT: usize = 1000;
pub const TOP_FORKED_LIMIT: usize = 10;

pub fn clamp_int(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

/// Bound a caller-supplied result count. Zero stays zero.
pub fn clamp_limit(value: usize, maximum: usize) -> usize {
    clamp_int(value, 0, maximum)
}

/// Trim a search needle and cap it at `MAX_QUERY_LENGTH` characters.
pub fn truncate_query(query: &str) -> String {
    query.trim().chars().take(MAX_QUERY_LENGTH).collect()
}
