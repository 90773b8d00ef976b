//! Size limits for outbound messages.
//!
//! All lengths are counted in `char`s so a cut never lands inside a UTF-8
//! sequence.

/// Longest header title a sink accepts.
pub const MAX_TITLE_CHARS: usize = 256;
/// Longest single header field value.
pub const MAX_FIELD_CHARS: usize = 1024;
/// Longest body chunk.
pub const MAX_CHUNK_CHARS: usize = 4000;

const ELLIPSIS: &str = "...";

/// Shorten `text` to at most `max` chars, ending in `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&ELLIPSIS[..max.min(ELLIPSIS.len())]);
    out
}

/// Split `body` into trimmed chunks of at most `max` chars.
///
/// While the remainder is longer than `max`, the cut goes at the last
/// newline inside the first `max` chars (the newline itself is dropped);
/// without one it is a hard cut at `max`. Chunks that trim to nothing are
/// skipped.
pub fn split_body(body: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        let (chunk, next) = match rest.char_indices().nth(max) {
            None => (rest, ""),
            Some((limit, _)) => match rest[..limit].rfind('\n') {
                Some(nl) => (&rest[..nl], &rest[nl + 1..]),
                None => (&rest[..limit], &rest[limit..]),
            },
        };

        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        rest = next;
    }

    chunks
}

/// Title for chunk `part` (1-based) of `total`.
pub fn chunk_title(label: &str, part: usize, total: usize) -> String {
    if total == 1 {
        label.to_string()
    } else {
        format!("{label} (Part {part})")
    }
}
