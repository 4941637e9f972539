use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Key strings are one or more ASCII alphanumerics.
#[must_use]
pub fn validate_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|ch| ch.is_ascii_alphanumeric())
}

/// Canonical forward-slash form of a path string.
///
/// Backslashes become `/`, repeated separators and `.` segments collapse, and a
/// trailing separator is dropped (except for the root itself).
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let absolute = unified.starts_with('/');
    let segments = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>();

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{joined}"),
        (false, _) => joined,
    }
}

/// Parent of a normalized path, or an empty string at the top.
#[must_use]
pub fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => "/".to_string(),
        Some(index) if index > 0 => path[..index].to_string(),
        _ => String::new(),
    }
}

/// Whether `path` equals `root` or lies beneath it.
#[must_use]
pub fn is_within(path: &str, root: &str) -> bool {
    if root.is_empty() {
        return false;
    }
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/') || root.ends_with('/'))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Segment<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn segments(key: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = key.as_bytes();
    while start < bytes.len() {
        let numeric = bytes[start].is_ascii_digit();
        let end = bytes[start..]
            .iter()
            .position(|byte| byte.is_ascii_digit() != numeric)
            .map_or(bytes.len(), |offset| start + offset);
        let piece = &key[start..end];
        out.push(if numeric { Segment::Number(piece) } else { Segment::Text(piece) });
        start = end;
    }
    out
}

fn compare_numbers(lhs: &str, rhs: &str) -> Ordering {
    let lhs_trimmed = lhs.trim_start_matches('0');
    let rhs_trimmed = rhs.trim_start_matches('0');
    lhs_trimmed
        .len()
        .cmp(&rhs_trimmed.len())
        .then_with(|| lhs_trimmed.cmp(rhs_trimmed))
        .then_with(|| lhs.len().cmp(&rhs.len()))
}

fn compare_segments(lhs: Segment<'_>, rhs: Segment<'_>) -> Ordering {
    match (lhs, rhs) {
        (Segment::Number(a), Segment::Number(b)) => compare_numbers(a, b),
        (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
        (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
        (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
    }
}

/// Hierarchical key comparison.
///
/// Keys split into digit and letter runs; digit runs compare numerically and a key
/// that is a run-prefix of another sorts first, so `1A` < `1A1` < `1A2` < `1A10` <
/// `1Aa` < `1B`.
#[must_use]
pub fn compare_keys(lhs: &str, rhs: &str) -> Ordering {
    let lhs_segments = segments(lhs);
    let rhs_segments = segments(rhs);
    for (a, b) in lhs_segments.iter().zip(rhs_segments.iter()) {
        let ordering = compare_segments(*a, *b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    lhs_segments.len().cmp(&rhs_segments.len()).then_with(|| lhs.cmp(rhs))
}

/// Canonical key order over a set of key strings. Duplicates collapse.
///
/// Compute this once per operation and pass the result around; every index into
/// a grid is only meaningful relative to the order it was built from.
#[must_use]
pub fn order_keys<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique = keys.into_iter().map(|key| key.as_ref().to_string()).collect::<BTreeSet<_>>();
    let mut ordered = unique.into_iter().collect::<Vec<_>>();
    ordered.sort_by(|lhs, rhs| compare_keys(lhs, rhs));
    ordered
}
