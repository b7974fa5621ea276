//! Shard routing: derives where a name group lives inside a sharded store.

use std::path::PathBuf;

/// Fills short prefixes and replaces characters unusable in a directory name.
pub const PREFIX_SENTINEL: char = '_';

/// Extension of every shard document.
pub const SHARD_EXTENSION: &str = "json";

/// Two-character directory a name is filed under.
///
/// The name is lower-cased and its first two characters are kept. Shorter
/// names are left-padded with `_`. Anything but ASCII alphanumerics, `.`
/// and `-` becomes `_`, as does a leading `.` or `-`.
pub fn shard_dir(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut prefix: Vec<char> = lower.chars().take(2).collect();
    while prefix.len() < 2 {
        prefix.insert(0, PREFIX_SENTINEL);
    }
    prefix
        .into_iter()
        .enumerate()
        .map(|(i, c)| match c {
            '.' | '-' if i == 0 => PREFIX_SENTINEL,
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' => c,
            _ => PREFIX_SENTINEL,
        })
        .collect()
}

/// File name of the shard holding `name`.
///
/// Bytes outside `[a-z0-9._-]` of the lower-cased name are written as `%XX`.
pub fn shard_file_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut out = String::with_capacity(lower.len() + SHARD_EXTENSION.len() + 1);
    for byte in lower.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    if out.is_empty() {
        out.push(PREFIX_SENTINEL);
    }
    out.push('.');
    out.push_str(SHARD_EXTENSION);
    out
}

/// Path of the shard for `name`, relative to the store root.
pub fn shard_path(name: &str) -> PathBuf {
    PathBuf::from(shard_dir(name)).join(shard_file_name(name))
}
