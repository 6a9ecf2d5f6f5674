//! Dotted numeric version comparison and increment.

use std::cmp::Ordering;

/// Split a version string into numeric components. Non-numeric components count as 0.
fn components(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|part| part.trim().parse::<u64>().unwrap_or(0))
        .collect()
}

/// Compare two dotted versions component by component. Missing trailing
/// components are treated as 0, so `"1.2"` equals `"1.2.0"`.
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Increment only the last dot-separated component: `"1.2.3"` becomes `"1.2.4"`.
pub fn increment_last(version: &str) -> String {
    let mut parts: Vec<String> = version.trim().split('.').map(str::to_string).collect();
    if let Some(last) = parts.last_mut() {
        let n = last.trim().parse::<u64>().unwrap_or(0);
        *last = (n + 1).to_string();
    }
    parts.join(".")
}

/// Pick the greatest version from an iterator, by [`compare`].
pub fn max_version<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    versions.into_iter().max_by(|a, b| compare(a, b))
}
