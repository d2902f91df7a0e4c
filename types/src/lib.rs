//! Domain and wire types for rallyd.
//!
//! This crate contains pure types with no IO and no async. The server, the
//! client library and the CLI all speak through these definitions, so a field
//! renamed here is a wire-format change.

mod ids;
mod log;
mod records;
mod report;
mod requests;
mod status;

pub use ids::{DeploymentId, RunId, TaskId, VerificationId};
pub use log::{DEFAULT_LOG_START_LINE, LogSlice, slice_lines};
pub use records::{
    ApiMap, DeploymentList, DeploymentRecord, Message, Run, RunList, RunResults, TaskList,
    TaskRecord, TempestStatus, VerificationList, VerificationRecord,
};
pub use report::{ReportFormatError, TaskReportFormat, VerificationReportFormat};
pub use requests::{
    CreateDeploymentRequest, CreateTaskRequest, DEFAULT_VERIFICATION_SET, InstallTempestRequest,
    RunVerificationRequest, StartRunRequest,
};
pub use status::{RunState, TaskStatus};
