//! Reversible mapping between `user~job` identifiers and controller-legal
//! framework names.
//!
//! Names the system synthesized itself (prefixed with `unknown`) and names
//! without a separator go through a lossy sanitizer. Lossy names are not
//! guaranteed to be unique: `Alice~Job` and `alice~job` collapse to the same
//! string, and no collision detection is attempted here.

use lazy_static::lazy_static;
use regex::Regex;

use super::SEPARATOR;

/// Marker prefix for losslessly encoded names.
pub const HEX_PREFIX: &str = "hex";

const UNKNOWN_PREFIX: &str = "unknown";

lazy_static! {
    static ref ILLEGAL_CHARS: Regex = Regex::new(r"[^a-z0-9]").unwrap();
}

/// Lower-cases `name` and removes everything outside `[a-z0-9]`.
pub fn sanitize(name: &str) -> String {
    ILLEGAL_CHARS
        .replace_all(&name.to_lowercase(), "")
        .into_owned()
}

pub fn encode(name: &str) -> String {
    if name.starts_with(UNKNOWN_PREFIX) || !name.contains(SEPARATOR) {
        sanitize(name)
    } else {
        format!("{}{}", HEX_PREFIX, hex::encode(name.as_bytes()))
    }
}

/// Recovers the job name from a framework name.
///
/// Only the part after the first separator is returned. Names that were not
/// hex encoded, or whose payload is not valid hex/UTF-8, come back unchanged.
pub fn decode(name: &str) -> String {
    let Some(payload) = name.strip_prefix(HEX_PREFIX) else {
        return name.to_string();
    };
    let decoded = hex::decode(payload)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    match decoded {
        Some(full) => match full.split_once(SEPARATOR) {
            Some((_, job_name)) => job_name.to_string(),
            None => full,
        },
        None => name.to_string(),
    }
}
