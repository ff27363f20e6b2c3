//! Lenient app version parsing
//!
//! Bundle and catalog versions are rarely strict semver: "2.1", "1.0.3.7",
//! "v3.0" and "1.2b4" all occur. Versions are normalised to three numeric
//! components before being handed to `semver` for ordering. Anything that
//! still does not parse compares as an opaque string.

use std::cmp::Ordering;
use std::fmt;

/// A comparable version string
#[derive(Debug, Clone)]
pub struct AppVersion {
    raw: String,
    parsed: Option<semver::Version>,
}

impl AppVersion {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let parsed = normalize(&raw).and_then(|n| semver::Version::parse(&n).ok());
        Self { raw, parsed }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the version carries a prerelease tag (e.g. `1.2.0-beta.1`)
    pub fn is_prerelease(&self) -> bool {
        self.parsed
            .as_ref()
            .map(|v| !v.pre.is_empty())
            .unwrap_or(false)
    }

    /// Whether the version could be understood numerically
    pub fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }
}

fn normalize(raw: &str) -> Option<String> {
    let stripped = raw.trim_start_matches(['v', 'V']);
    if stripped.is_empty() {
        return None;
    }

    let (core, pre) = match stripped.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => split_trailing_tag(stripped),
    };

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    let build = if parts.len() > 3 {
        Some(parts.split_off(3).join("."))
    } else {
        None
    };
    while parts.len() < 3 {
        parts.push("0");
    }

    // Strip leading zeros; semver rejects "01"
    let numeric: Vec<String> = parts
        .iter()
        .map(|p| p.parse::<u64>().map(|n| n.to_string()))
        .collect::<Result<_, _>>()
        .ok()?;

    let mut out = numeric.join(".");
    if let Some(pre) = pre.filter(|p| !p.is_empty()) {
        out.push('-');
        out.push_str(&sanitize_identifier(pre));
    }
    if let Some(build) = build {
        out.push('+');
        out.push_str(&build);
    }
    Some(out)
}

/// "1.2b4" -> ("1.2", "b4")
fn split_trailing_tag(s: &str) -> (&str, Option<&str>) {
    match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) if idx > 0 => (s[..idx].trim_end_matches('.'), Some(&s[idx..])),
        _ => (s, None),
    }
}

fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '.' })
        .collect::<String>()
        .split('.')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AppVersion {}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.parsed, &other.parsed) {
            (Some(a), Some(b)) => a.cmp_precedence(b).then_with(|| a.build.cmp(&b.build)),
            // Parsed versions sort above unparseable ones
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Whether `available` is strictly newer than `installed`
///
/// Returns false when either side is unparseable; an unknown version never
/// triggers an update prompt.
pub fn is_newer(available: &str, installed: &str) -> bool {
    let a = AppVersion::parse(available);
    let i = AppVersion::parse(installed);
    a.is_parsed() && i.is_parsed() && a > i
}

/// Whether a candidate release should replace the current canonical one
///
/// Releases beat prereleases regardless of version unless prereleases are
/// opted in; otherwise the higher version wins and ties keep the current one.
pub fn supersedes(
    candidate: &AppVersion,
    candidate_prerelease: bool,
    current: &AppVersion,
    current_prerelease: bool,
    include_prereleases: bool,
) -> bool {
    if !include_prereleases && candidate_prerelease != current_prerelease {
        return current_prerelease;
    }
    candidate > current
}
