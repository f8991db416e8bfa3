//! Outcome aggregation for the cleanup pipeline.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::isolation::UserFolder;

/// Result of one cleanup step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step did its work.
    Succeeded,
    /// There was nothing to do.
    Skipped(String),
    /// The step failed; later steps still ran.
    Warning(String),
}

impl StepOutcome {
    /// Returns `true` for [`StepOutcome::Warning`].
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }
}

/// Identifies a cleanup step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "target", rename_all = "snake_case")]
pub enum CleanupStep {
    /// Stopping the change tracker.
    StopTracker,
    /// Restoring one redirected folder.
    Restore(UserFolder),
    /// Reverting the configuration snapshot.
    SnapshotRestore,
    /// Scrubbing one browser.
    BrowserScrub(String),
    /// Purging one temp location.
    TempPurge(PathBuf),
    /// Resetting the recently-used list.
    RecentList,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopTracker => f.write_str("stop tracker"),
            Self::Restore(folder) => write!(f, "restore {folder}"),
            Self::SnapshotRestore => f.write_str("snapshot restore"),
            Self::BrowserScrub(browser) => write!(f, "browser scrub ({browser})"),
            Self::TempPurge(path) => write!(f, "temp purge ({})", path.display()),
            Self::RecentList => f.write_str("recent list reset"),
        }
    }
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Which step.
    #[serde(flatten)]
    pub step: CleanupStep,
    /// How it went.
    pub result: StepOutcome,
}

/// Every step of one cleanup run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    steps: Vec<StepRecord>,
}

impl CleanupReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn record(&mut self, step: CleanupStep, result: StepOutcome) {
        self.steps.push(StepRecord { step, result });
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Outcome of the first step matching `step`.
    #[must_use]
    pub fn outcome_of(&self, step: &CleanupStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| &r.step == step).map(|r| &r.result)
    }

    /// Number of steps that ended in a warning.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.steps.iter().filter(|r| r.result.is_warning()).count()
    }

    /// Warnings formatted as `"<step>: <reason>"`.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|r| match &r.result {
                StepOutcome::Warning(reason) => Some(format!("{}: {reason}", r.step)),
                _ => None,
            })
            .collect()
    }

    /// `"completed"` or `"completed with N warning(s)"`.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.warning_count() {
            0 => "completed".to_string(),
            1 => "completed with 1 warning".to_string(),
            n => format!("completed with {n} warnings"),
        }
    }
}
