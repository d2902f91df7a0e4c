//! File layout inside the server's working directory.
//!
//! Every file the facade writes or serves lives directly in the workdir:
//!
//! | file | contents |
//! |---|---|
//! | `task_<uuid>.log` | output of `rally task start` |
//! | `task_<uuid>_detailed.log` | `rally task detailed` |
//! | `task_<uuid>.html`, `task_<uuid>.xml` | task reports |
//! | `run_<run>_<task>.html` | per-run task reports |
//! | `tempest_<uuid>.log` | output of `rally verify start` |
//! | `tempest_<uuid>.html`, `tempest_<uuid>.json` | verification reports |
//! | `tempest_installation_<deployment>.log` | tempest install output |
//! | `.<prefix>_<uuid>.<ext>` | scratch files handed to the toolkit |

use std::path::{Path, PathBuf};

use rallyd_types::{DeploymentId, RunId, TaskId, TaskReportFormat, VerificationId, VerificationReportFormat};

use crate::error::RallyError;

/// Name prefixes of the files `/result/{filename}` may serve.
const RESULT_PREFIXES: &[&str] = &["run_", "task_", "tempest_"];

#[derive(Debug, Clone)]
pub struct Workdir {
    root: PathBuf,
}

/// Reject ids and file names that would escape the workdir.
pub fn validate_file_component(name: &str) -> Result<&str, RallyError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
    {
        return Err(RallyError::invalid(format!("invalid file name '{name}'")));
    }
    Ok(trimmed)
}

impl Workdir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure(&self) -> Result<(), RallyError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RallyError::io(&self.root, e))
    }

    fn file(&self, name: &str) -> Result<PathBuf, RallyError> {
        Ok(self.root.join(validate_file_component(name)?))
    }

    pub fn task_log(&self, task: &TaskId) -> Result<PathBuf, RallyError> {
        self.file(&format!("task_{}.log", validate_file_component(task.as_str())?))
    }

    pub fn task_detailed(&self, task: &TaskId) -> Result<PathBuf, RallyError> {
        self.file(&format!(
            "task_{}_detailed.log",
            validate_file_component(task.as_str())?
        ))
    }

    pub fn task_report(&self, task: &TaskId, format: TaskReportFormat) -> Result<PathBuf, RallyError> {
        self.file(&format!(
            "task_{}.{}",
            validate_file_component(task.as_str())?,
            format.extension()
        ))
    }

    pub fn run_report(&self, run: &RunId, task: &TaskId) -> Result<PathBuf, RallyError> {
        self.file(&format!(
            "run_{}_{}.html",
            validate_file_component(run.as_str())?,
            validate_file_component(task.as_str())?
        ))
    }

    pub fn tempest_log(&self, verification: &VerificationId) -> Result<PathBuf, RallyError> {
        self.file(&format!(
            "tempest_{}.log",
            validate_file_component(verification.as_str())?
        ))
    }

    pub fn verification_report(
        &self,
        verification: &VerificationId,
        format: VerificationReportFormat,
    ) -> Result<PathBuf, RallyError> {
        self.file(&format!(
            "tempest_{}.{}",
            validate_file_component(verification.as_str())?,
            format.as_str()
        ))
    }

    pub fn tempest_install_log(&self, deployment: &DeploymentId) -> Result<PathBuf, RallyError> {
        self.file(&format!(
            "tempest_installation_{}.log",
            validate_file_component(deployment.as_str())?
        ))
    }

    /// Fresh hidden name for a file handed to the toolkit, e.g. a task
    /// config. Never downloadable through `result_file`.
    #[must_use]
    pub fn scratch(&self, prefix: &str, extension: &str) -> PathBuf {
        self.root
            .join(format!(".{prefix}_{}.{extension}", uuid::Uuid::new_v4()))
    }

    /// Path of a downloadable result file.
    ///
    /// Only logs and reports rallyd names itself are served; the workdir may
    /// be shared (`/tmp` by default) and also holds the server log.
    pub fn result_file(&self, filename: &str) -> Result<PathBuf, RallyError> {
        let name = validate_file_component(filename)?;
        if !RESULT_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            return Err(RallyError::not_found("file", name));
        }
        self.file(name)
    }
}

/// Read a text file into lines, keeping line terminators like the log endpoint expects.
pub async fn read_lines(path: &Path) -> Result<Vec<String>, RallyError> {
    let content = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RallyError::not_found("file", path.display().to_string())
        } else {
            RallyError::io(path, e)
        }
    })?;
    let text = String::from_utf8_lossy(&content);
    Ok(text.split_inclusive('\n').map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_layout() {
        let wd = Workdir::new("/tmp/rallyd");
        let task = TaskId::new("t-1");
        assert_eq!(wd.task_log(&task).unwrap(), Path::new("/tmp/rallyd/task_t-1.log"));
        assert_eq!(
            wd.task_detailed(&task).unwrap(),
            Path::new("/tmp/rallyd/task_t-1_detailed.log")
        );
        assert_eq!(
            wd.task_report(&task, TaskReportFormat::Junit).unwrap(),
            Path::new("/tmp/rallyd/task_t-1.xml")
        );
        assert_eq!(
            wd.run_report(&RunId::new("r-1"), &task).unwrap(),
            Path::new("/tmp/rallyd/run_r-1_t-1.html")
        );
        assert_eq!(
            wd.verification_report(&VerificationId::new("v-1"), VerificationReportFormat::Json)
                .unwrap(),
            Path::new("/tmp/rallyd/tempest_v-1.json")
        );
        assert_eq!(
            wd.tempest_install_log(&DeploymentId::new("d-1")).unwrap(),
            Path::new("/tmp/rallyd/tempest_installation_d-1.log")
        );
    }

    #[test]
    fn traversal_is_rejected() {
        let wd = Workdir::new("/tmp/rallyd");
        assert!(wd.result_file("../etc/passwd").is_err());
        assert!(wd.result_file("a/b.html").is_err());
        assert!(wd.result_file("a\\b.html").is_err());
        assert!(wd.result_file("..").is_err());
        assert!(wd.result_file("").is_err());
        assert!(wd.task_log(&TaskId::new("../x")).is_err());
        assert!(wd.result_file("task_t-1.html").is_ok());
    }

    #[test]
    fn scratch_names_are_unique() {
        let wd = Workdir::new("/tmp/rallyd");
        assert_ne!(wd.scratch("task", "json"), wd.scratch("task", "json"));
    }

    #[test]
    fn only_generated_files_are_results() {
        let wd = Workdir::new("/tmp/rallyd");
        assert!(wd.result_file("run_r-1_t-1.html").is_ok());
        assert!(wd.result_file("tempest_v-1.json").is_ok());
        assert!(wd.result_file("task_t-1_detailed.log").is_ok());

        assert!(wd.result_file("rallyd.log").unwrap_err().is_not_found());
        assert!(wd.result_file("deployment_d-1.json").unwrap_err().is_not_found());

        let scratch = wd.scratch("task_config", "json");
        let name = scratch.file_name().unwrap().to_str().unwrap();
        assert!(wd.result_file(name).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn read_lines_keeps_terminators() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task_x.log");
        std::fs::write(&path, "a\nb\nc").unwrap();
        let lines = read_lines(&path).await.unwrap();
        assert_eq!(lines, vec!["a\n", "b\n", "c"]);
    }

    #[tokio::test]
    async fn read_lines_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_lines(&dir.path().join("missing.log")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
