use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug)]
pub enum LedgerError {
    Io(std::io::Error),
    Serialize(String),
    AlreadyFinalized,
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "ledger io error: {}", err),
            Self::Serialize(msg) => write!(f, "ledger serialize error: {}", msg),
            Self::AlreadyFinalized => write!(f, "ledger already finalized"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Terminal outcome of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Failed,
    DryRun,
    AlreadyCompliant,
    AppliedChanges,
}

impl RunStatus {
    /// Process exit code contract: 1 on error, 10 for the no-op case so
    /// automation can skip post-run steps, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Failed => 1,
            Self::AlreadyCompliant => 10,
            Self::DryRun | Self::AppliedChanges => 0,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Failed => "failed",
            Self::DryRun => "dry_run",
            Self::AlreadyCompliant => "already_compliant",
            Self::AppliedChanges => "applied_changes",
        };
        f.write_str(label)
    }
}

/// One applied, reversible mutation. An empty `rollback_command` marks the
/// change as irreversible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub component: String,
    pub detail: String,
    pub rollback_command: String,
    pub timestamp: u64,
}

impl ChangeRecord {
    pub fn is_irreversible(&self) -> bool {
        self.rollback_command.trim().is_empty()
    }
}

/// One action that would execute, recorded in lieu of execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub component: String,
    pub action: String,
    pub command: String,
    pub timestamp: u64,
}

/// The run-scoped audit record: appended during the run, finalized exactly
/// once, then immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLedger {
    pub script: String,
    pub started_at: u64,
    pub finished_at: Option<u64>,
    pub status: Option<RunStatus>,
    pub changes: Vec<ChangeRecord>,
    pub planned: Vec<PlannedAction>,
}

// Persisted views: the rollback artifact carries applied changes, the plan
// artifact carries planned actions. Both share the run header.
#[derive(Serialize)]
struct RollbackArtifact<'a> {
    script: &'a str,
    started_at: u64,
    finished_at: Option<u64>,
    status: Option<RunStatus>,
    changes: &'a [ChangeRecord],
}

#[derive(Serialize)]
struct PlanArtifact<'a> {
    script: &'a str,
    started_at: u64,
    finished_at: Option<u64>,
    status: Option<RunStatus>,
    planned: &'a [PlannedAction],
}

/// Writer owning the two per-run ledger artifacts. Unique timestamped
/// filenames keep concurrent or sequential runs from ever colliding.
#[derive(Debug)]
pub struct LedgerWriter {
    ledger: RunLedger,
    rollback_path: PathBuf,
    plan_path: PathBuf,
    finalized: bool,
}

impl LedgerWriter {
    /// Create two fresh ledger files under `state_dir` for a run of
    /// `script`, named `<script>_<nanos>_{rollback,plan}.json`.
    pub fn begin_run(state_dir: impl AsRef<Path>, script: &str) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        fs::create_dir_all(state_dir)?;

        let nonce = now_unix_nanos();
        let rollback_path = state_dir.join(format!("{}_{}_rollback.json", script, nonce));
        let plan_path = state_dir.join(format!("{}_{}_plan.json", script, nonce));

        let writer = Self {
            ledger: RunLedger {
                script: script.to_string(),
                started_at: now_unix_secs(),
                finished_at: None,
                status: None,
                changes: Vec::new(),
                planned: Vec::new(),
            },
            rollback_path,
            plan_path,
            finalized: false,
        };
        writer.persist_rollback()?;
        writer.persist_plan()?;
        info!(
            script,
            rollback = %writer.rollback_path.display(),
            plan = %writer.plan_path.display(),
            "run ledgers created"
        );
        Ok(writer)
    }

    pub fn append_change(&mut self, record: ChangeRecord) -> Result<()> {
        if self.finalized {
            return Err(LedgerError::AlreadyFinalized);
        }
        self.ledger.changes.push(record);
        self.persist_rollback()
    }

    pub fn append_plan(&mut self, action: PlannedAction) -> Result<()> {
        if self.finalized {
            return Err(LedgerError::AlreadyFinalized);
        }
        self.ledger.planned.push(action);
        self.persist_plan()
    }

    /// Record `finished_at` and the terminal status. Calling this twice is
    /// an error; the ledger is immutable afterwards.
    pub fn finalize(&mut self, status: RunStatus) -> Result<()> {
        if self.finalized {
            return Err(LedgerError::AlreadyFinalized);
        }
        self.ledger.finished_at = Some(now_unix_secs());
        self.ledger.status = Some(status);
        self.persist_rollback()?;
        self.persist_plan()?;
        self.finalized = true;
        Ok(())
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    pub fn change_count(&self) -> usize {
        self.ledger.changes.len()
    }

    pub fn plan_count(&self) -> usize {
        self.ledger.planned.len()
    }

    pub fn rollback_path(&self) -> &Path {
        &self.rollback_path
    }

    pub fn plan_path(&self) -> &Path {
        &self.plan_path
    }

    fn persist_rollback(&self) -> Result<()> {
        let artifact = RollbackArtifact {
            script: &self.ledger.script,
            started_at: self.ledger.started_at,
            finished_at: self.ledger.finished_at,
            status: self.ledger.status,
            changes: &self.ledger.changes,
        };
        let payload = serde_json::to_vec_pretty(&artifact)
            .map_err(|err| LedgerError::Serialize(err.to_string()))?;
        write_atomic(&self.rollback_path, &payload)
    }

    fn persist_plan(&self) -> Result<()> {
        let artifact = PlanArtifact {
            script: &self.ledger.script,
            started_at: self.ledger.started_at,
            finished_at: self.ledger.finished_at,
            status: self.ledger.status,
            planned: &self.ledger.planned,
        };
        let payload = serde_json::to_vec_pretty(&artifact)
            .map_err(|err| LedgerError::Serialize(err.to_string()))?;
        write_atomic(&self.plan_path, &payload)
    }
}

/// Write to a temp file in the same directory, then rename over the target
/// so a failed write never corrupts previously persisted content.
fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "tmp-{}-{}",
        std::process::id(),
        now_unix_nanos()
    ));
    fs::write(&tmp_path, payload)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Remove the oldest ledger pairs under `state_dir`, keeping the
/// `keep_count` most recent runs. Returns how many pairs were removed.
pub fn cleanup_old_runs(state_dir: impl AsRef<Path>, keep_count: usize) -> Result<usize> {
    let state_dir = state_dir.as_ref();
    let mut rollback_files = Vec::new();
    for entry in fs::read_dir(state_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with("_rollback.json") {
            rollback_files.push(path);
        }
    }
    // Filenames embed a nanosecond timestamp; sort by it so pruning order
    // is run age even when several scripts share the state dir.
    rollback_files.sort_by_key(|path| {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        (run_nanos(name).unwrap_or(0), name.to_string())
    });
    if rollback_files.len() <= keep_count {
        return Ok(0);
    }

    let excess = rollback_files.len() - keep_count;
    let mut removed = 0;
    for rollback in rollback_files.into_iter().take(excess) {
        let plan = sibling_plan_path(&rollback);
        fs::remove_file(&rollback)?;
        if plan.exists() {
            fs::remove_file(&plan)?;
        }
        removed += 1;
    }
    info!(removed, keep_count, "pruned old run ledgers");
    Ok(removed)
}

fn run_nanos(name: &str) -> Option<u128> {
    name.strip_suffix("_rollback.json")?
        .rsplit('_')
        .next()?
        .parse()
        .ok()
}

fn sibling_plan_path(rollback: &Path) -> PathBuf {
    let name = rollback
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .replace("_rollback.json", "_plan.json");
    rollback.with_file_name(name)
}

pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn now_unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests;
