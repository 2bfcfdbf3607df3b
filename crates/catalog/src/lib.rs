use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Sentinel for optional rule fields that were not supplied.
pub const MISSING: &str = "missing";

/// Fix sentinel: the rule requires manual action and must never be
/// auto-remediated.
pub const MANUAL_FIX: &str = "manual";

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(String),
    DuplicateId(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed reading rule store: {}", err),
            Self::Parse(msg) => write!(f, "failed parsing rule document: {}", msg),
            Self::DuplicateId(id) => write!(f, "duplicate rule id '{}'", id),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// One declarative security control, loaded from the rule store and
/// immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRule {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub discussion: String,
    pub check: String,
    pub fix: String,
    #[serde(default = "missing_sentinel")]
    pub odv: String,
    #[serde(default)]
    pub references: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub result: Vec<String>,
    #[serde(default = "missing_sentinel")]
    pub mobileconfig: String,
    /// Supported macOS major versions, e.g. "26" or "26, 27".
    /// Absent means the rule applies to any version.
    #[serde(default)]
    pub macos: Option<String>,
}

fn missing_sentinel() -> String {
    MISSING.to_string()
}

impl SecurityRule {
    /// Whether the rule carries a fix the engine may execute. The `manual`
    /// and `missing` sentinels (and an empty fix) forbid auto-remediation.
    pub fn has_executable_fix(&self) -> bool {
        let fix = self.fix.trim();
        !fix.is_empty() && fix != MANUAL_FIX && fix != MISSING
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the rule applies to the given macOS major version.
    /// Rules without a `macos` key apply everywhere.
    pub fn compatible_with_major(&self, target_major: Option<u64>) -> bool {
        let Some(target) = target_major else {
            return true;
        };
        let Some(raw) = self.macos.as_deref() else {
            return true;
        };
        let majors: Vec<u64> = raw
            .split([',', ' '])
            .filter_map(parse_major_version)
            .collect();
        if majors.is_empty() {
            return true;
        }
        majors.contains(&target)
    }
}

/// Extract the leading major component from a version token like "26.3".
pub fn parse_major_version(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Read-only rule collection with id lookup. Rules keep their load order.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<SecurityRule>,
    index: HashMap<String, usize>,
}

impl RuleCatalog {
    /// Build a catalog from already-parsed rules, rejecting duplicates and
    /// rules with empty required keys.
    pub fn from_rules(rules: Vec<SecurityRule>) -> Result<Self> {
        let mut catalog = Self::default();
        for rule in rules {
            catalog.push(rule)?;
        }
        Ok(catalog)
    }

    /// Parse a YAML document holding a list of rules.
    pub fn load_str(raw: &str) -> Result<Self> {
        let rules: Vec<SecurityRule> =
            serde_yaml::from_str(raw).map_err(|err| CatalogError::Parse(err.to_string()))?;
        Self::from_rules(rules)
    }

    /// Load every `.yaml` file under `dir` (one rule per file, sorted by
    /// path so catalog order is stable across runs).
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut catalog = Self::default();
        for path in &paths {
            let raw = fs::read_to_string(path)?;
            let rule: SecurityRule = serde_yaml::from_str(&raw).map_err(|err| {
                CatalogError::Parse(format!("{}: {}", path.display(), err))
            })?;
            catalog.push(rule)?;
        }
        info!(rules = catalog.len(), dir = %dir.display(), "rule catalog loaded");
        Ok(catalog)
    }

    fn push(&mut self, rule: SecurityRule) -> Result<()> {
        if rule.id.trim().is_empty() {
            return Err(CatalogError::Parse("rule has empty id".to_string()));
        }
        if rule.check.trim().is_empty() {
            return Err(CatalogError::Parse(format!(
                "rule '{}' has empty check",
                rule.id
            )));
        }
        if rule.fix.trim().is_empty() {
            return Err(CatalogError::Parse(format!(
                "rule '{}' has empty fix (use the '{}' sentinel)",
                rule.id, MANUAL_FIX
            )));
        }
        if self.index.contains_key(&rule.id) {
            return Err(CatalogError::DuplicateId(rule.id));
        }
        self.index.insert(rule.id.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<&SecurityRule> {
        self.index.get(id).map(|i| &self.rules[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecurityRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Select rules carrying `tag` (the `all_rules` keyword selects every
    /// rule) that are compatible with the target macOS major version.
    /// Skipped-incompatible counts are logged, matching operator
    /// expectations from tag-driven runs.
    pub fn select(&self, tag: &str, target_major: Option<u64>) -> Vec<&SecurityRule> {
        let matching: Vec<&SecurityRule> = self
            .rules
            .iter()
            .filter(|rule| tag == "all_rules" || rule.has_tag(tag))
            .collect();
        let total = matching.len();
        let compatible: Vec<&SecurityRule> = matching
            .into_iter()
            .filter(|rule| rule.compatible_with_major(target_major))
            .collect();
        let skipped = total - compatible.len();
        if skipped > 0 {
            if let Some(major) = target_major {
                info!(skipped, major, "skipped rules incompatible with macOS major");
            }
        }
        compatible
    }

    /// Unique tags across the catalog, plus the `all_rules` keyword.
    pub fn available_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .rules
            .iter()
            .flat_map(|rule| rule.tags.iter().cloned())
            .collect();
        tags.push("all_rules".to_string());
        tags.sort();
        tags.dedup();
        tags
    }
}
