use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Compliance status of a single control or probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityStatus {
    Secure,
    Warning,
    Critical,
    Unknown,
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Secure => "secure",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    InvalidVersionFormat(String),
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersionFormat(raw) => {
                write!(f, "invalid version format '{}'", raw)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Token-based status inference. Secure iff `output` contains every token
/// in `expected_tokens` (case-sensitive substring, order irrelevant).
///
/// A non-match is a heuristic "needs attention", never proof of
/// misconfiguration, so the result is Warning rather than Critical.
pub fn classify<S: AsRef<str>>(output: &str, expected_tokens: &[S]) -> SecurityStatus {
    if expected_tokens
        .iter()
        .all(|token| output.contains(token.as_ref()))
    {
        SecurityStatus::Secure
    } else {
        SecurityStatus::Warning
    }
}

/// Whether `current` is at least `minimum` under component-wise numeric
/// ordering of dot-separated versions. Missing trailing components count
/// as zero, so "26" == "26.0".
pub fn meets_minimum(current: &str, minimum: &str) -> Result<bool, VersionError> {
    Ok(compare_versions(current, minimum)? != Ordering::Less)
}

fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let a = parse_components(a)?;
    let b = parse_components(b)?;
    let len = a.len().max(b.len());
    for i in 0..len {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }
    Ok(Ordering::Equal)
}

fn parse_components(raw: &str) -> Result<Vec<u64>, VersionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(VersionError::InvalidVersionFormat(raw.to_string()));
    }
    trimmed
        .split('.')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| VersionError::InvalidVersionFormat(raw.to_string()))
        })
        .collect()
}

/// Composite baseline status gating a hardening run: Secure when the live
/// OS version meets the configured minimum; otherwise Warning, or Critical
/// when baseline enforcement is mandatory. An unparseable version string
/// yields Unknown instead of failing the run; the caller surfaces the
/// warning.
pub fn baseline_status(current: &str, minimum: &str, enforce: bool) -> SecurityStatus {
    match meets_minimum(current, minimum) {
        Ok(true) => SecurityStatus::Secure,
        Ok(false) if enforce => SecurityStatus::Critical,
        Ok(false) => SecurityStatus::Warning,
        Err(_) => SecurityStatus::Unknown,
    }
}
