//! Error signature normalization.
//!
//! Two error messages that differ only in incidental detail (where the file
//! lives, when it happened, which address blew up) should collapse into the
//! same signature so that a stored memory can be found again by exact match.

use regex::Regex;
use std::sync::LazyLock;

pub const TIME_TOKEN: &str = "<TIME>";
pub const PATH_TOKEN: &str = "<PATH>";
pub const LINE_TOKEN: &str = ":<LINE>";
pub const HEX_TOKEN: &str = "<HEX>";
pub const UUID_TOKEN: &str = "<UUID>";

// The timestamp pass must run before the line pass: `14:30:00` would
// otherwise be eaten as two `:N` suffixes.
#[allow(clippy::expect_used)]
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}").expect("timestamp pattern")
});

#[allow(clippy::expect_used)]
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Za-z]:)?[\\/][\w.\-\\/]+").expect("path pattern")
});

#[allow(clippy::expect_used)]
static LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?::|line\s+)\d+").expect("line pattern"));

#[allow(clippy::expect_used)]
static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0x[0-9a-fA-F]+").expect("hex pattern"));

#[allow(clippy::expect_used)]
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("uuid pattern")
});

#[allow(clippy::expect_used)]
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Map raw error text to a stable signature.
///
/// Pure and idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let sig = TIME_RE.replace_all(text, TIME_TOKEN);
    let sig = PATH_RE.replace_all(&sig, PATH_TOKEN);
    let sig = LINE_RE.replace_all(&sig, LINE_TOKEN);
    let sig = HEX_RE.replace_all(&sig, HEX_TOKEN);
    let sig = UUID_RE.replace_all(&sig, UUID_TOKEN);
    WS_RE.replace_all(&sig, " ").trim().to_string()
}

/// Stateless handle over [`normalize`], for callers that want to hold the
/// normalizer as a component next to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureNormalizer;

impl SignatureNormalizer {
    pub fn normalize(&self, text: &str) -> String {
        normalize(text)
    }
}
