//! Tag/path extraction from the inbound click path.
//!
//! Some link builders concatenate the offer domain and its sub-path into a
//! single segment with no separator (`example.compath`). The normalizer
//! detects the glued form by the TLD boundary and splices it back into two
//! segments; well-formed input passes through untouched.

/// TLD markers the legacy link builder produced glued segments for.
const TLD_MARKERS: [&str; 4] = [".com", ".net", ".org", ".ru"];

/// Offer coordinates extracted from the click path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPath {
    /// The offer's domain.
    pub tag: String,
    /// Sub-path within the offer, `/`-joined, possibly empty.
    pub path: String,
}

/// Splits `segments` into the offer tag and the residual path, un-gluing
/// the first segment when needed. Idempotent on already-clean input.
pub fn normalize(segments: &[String]) -> TagPath {
    let mut segments: Vec<String> = segments
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();

    if let Some(first) = segments.first()
        && let Some(domain_end) = glued_boundary(first)
    {
        let domain = first[..domain_end].to_string();
        let residual = first[domain_end..].to_string();
        segments.splice(0..1, [domain, residual]);
    }

    let tag = segments.first().cloned().unwrap_or_default();
    let path = segments
        .iter()
        .skip(1)
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("/");

    TagPath { tag, path }
}

/// Finds the earliest TLD boundary that has more content glued on after it
/// (not a `/`, at least one character). Returns the byte offset past the
/// TLD, or `None` when the segment is already well-formed.
fn glued_boundary(segment: &str) -> Option<usize> {
    // (start, end) of the leftmost qualifying boundary across all markers.
    let mut best: Option<(usize, usize)> = None;

    for marker in TLD_MARKERS {
        let mut from = 0;
        while let Some(pos) = segment[from..].find(marker) {
            let start = from + pos;
            let end = start + marker.len();
            let rest = &segment[end..];
            if !rest.is_empty() && !rest.starts_with('/') {
                if best.is_none_or(|(prev_start, _)| start < prev_start) {
                    best = Some((start, end));
                }
                break;
            }
            from = start + 1;
        }
    }

    best.map(|(_, end)| end)
}
