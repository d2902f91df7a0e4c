//! Toolkit backend for rallyd.
//!
//! [`RallyBackend`] is the seam between the HTTP layer and the toolkit.
//! [`RallyCli`] drives the real `rally` executable; [`FakeRally`] keeps
//! everything in memory for tests. [`RunRegistry`] groups tasks into runs on
//! top of either.

pub mod backend;
pub mod error;
pub mod fake;
pub mod jobs;
pub mod process;
pub mod rally_cli;
pub mod runs;
pub mod table;
pub mod workdir;

pub use backend::RallyBackend;
pub use error::RallyError;
pub use fake::FakeRally;
pub use jobs::JobTracker;
pub use rally_cli::{RallyCli, RallyCliSettings};
pub use runs::RunRegistry;
pub use workdir::{Workdir, read_lines, validate_file_component};
