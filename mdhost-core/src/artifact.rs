//! Artifact naming and remote path composition.
//!
//! Every upload is renamed to `<stem>_<YYYYMMDDHHmmssSSS><ext>` before it leaves the machine, so
//! re-sending the same artifact overwrites instead of duplicating, and two files sharing a base
//! name never collide.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local, Utc};

/// Format of the timestamp suffix: 14-digit date-time followed by 3-digit milliseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

static LAST_STAMP_MS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Returns a millisecond timestamp strictly greater than every one handed out before.
fn next_stamp_millis(now_ms: i64) -> i64 {
    let mut prev = LAST_STAMP_MS.load(Ordering::Acquire);
    loop {
        let next = if now_ms > prev { now_ms } else { prev + 1 };
        match LAST_STAMP_MS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Name under which a file is stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenamedArtifact {
    name: String,
}

impl RenamedArtifact {
    /// Derives a fresh name from `original_name` using the current local time.
    pub fn derive(original_name: &str) -> Self {
        let stamp_ms = next_stamp_millis(Utc::now().timestamp_millis());
        let at = DateTime::<Utc>::from_timestamp_millis(stamp_ms)
            .unwrap_or_else(Utc::now)
            .with_timezone(&Local);
        Self::derive_at(original_name, at)
    }

    /// Derives the name for a fixed instant.
    pub fn derive_at(original_name: &str, at: DateTime<Local>) -> Self {
        let (stem, extension) = split_extension(original_name);
        let name = format!("{stem}_{}{extension}", at.format(TIMESTAMP_FORMAT));
        Self { name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RenamedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Splits at the last `.`; the extension keeps its dot.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => name.split_at(idx),
        None => (name, ""),
    }
}

/// POSIX-style path in the backend's namespace.
///
/// Segments are joined verbatim; only empty segments collapse. Slashes inside a configured
/// directory are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath(String);

impl RemotePath {
    /// The directory itself, e.g. `images` → `/images`.
    pub fn dir(base: &str) -> Self {
        Self::from_segments(&[base])
    }

    /// A file inside `base`, e.g. (`images`, `a.png`) → `/images/a.png`.
    pub fn join(base: &str, name: &str) -> Self {
        Self::from_segments(&[base, name])
    }

    fn from_segments(segments: &[&str]) -> Self {
        let joined = segments
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        Self(format!("/{joined}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 7, 9, 5, 2)
            .single()
            .expect("unambiguous local time")
            + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn keeps_only_the_last_extension() {
        let artifact = RenamedArtifact::derive_at("foo.bar.png", fixed());
        assert_eq!(artifact.name(), "foo.bar_20240307090502042.png");
    }

    #[test]
    fn name_without_dot_has_no_extension() {
        let artifact = RenamedArtifact::derive_at("README", fixed());
        assert_eq!(artifact.name(), "README_20240307090502042");
    }

    #[test]
    fn sequential_names_never_collide() {
        let names: Vec<_> = (0..200)
            .map(|_| RenamedArtifact::derive("shot.png").name().to_owned())
            .collect();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().all(|n| n.starts_with("shot_") && n.ends_with(".png")));
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let a = next_stamp_millis(1_000);
        let b = next_stamp_millis(1_000);
        let c = next_stamp_millis(0);
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn remote_paths_collapse_empty_segments() {
        assert_eq!(RemotePath::join("images", "a.png").as_str(), "/images/a.png");
        assert_eq!(RemotePath::join("", "a.png").as_str(), "/a.png");
        assert_eq!(RemotePath::dir("").as_str(), "/");
        assert_eq!(RemotePath::join("notes/2024", "a.png").as_str(), "/notes/2024/a.png");
    }
}
