//! Task and run lifecycle states.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status string reported by the toolkit for a benchmark task.
///
/// The toolkit owns this vocabulary; anything it adds later round-trips
/// through [`TaskStatus::Other`] unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Init,
    Verifying,
    Verified,
    Running,
    SoftAborting,
    Aborting,
    Aborted,
    Finished,
    Failed,
    Crashed,
    Other(String),
}

impl TaskStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "init" => Self::Init,
            "verifying" => Self::Verifying,
            "verified" => Self::Verified,
            "running" => Self::Running,
            "soft_aborting" => Self::SoftAborting,
            "aborting" => Self::Aborting,
            "aborted" => Self::Aborted,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "crashed" => Self::Crashed,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "init",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::Running => "running",
            Self::SoftAborting => "soft_aborting",
            Self::Aborting => "aborting",
            Self::Aborted => "aborted",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Crashed => "crashed",
            Self::Other(raw) => raw,
        }
    }

    /// The task will not change state again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Crashed | Self::Aborted
        )
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Crashed | Self::Aborted)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Aggregate state of a run, derived from the statuses of its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    New,
    Running,
    Finished,
    Failed,
}

impl RunState {
    /// Fold task statuses into a run state.
    ///
    /// A run with no tasks is still `New`. Any failed task fails the run, even
    /// while others are still going.
    #[must_use]
    pub fn aggregate<'a, I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskStatus>,
    {
        let mut any = false;
        let mut all_finished = true;
        for status in statuses {
            any = true;
            if status.is_failure() {
                return Self::Failed;
            }
            if *status != TaskStatus::Finished {
                all_finished = false;
            }
        }
        match (any, all_finished) {
            (false, _) => Self::New,
            (true, true) => Self::Finished,
            (true, false) => Self::Running,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
