//! Shared infrastructure utilities for rallyd.
//!
//! - **`atomic_write`**: crash-safe file persistence (temp + rename)
//! - **`redact`**: keep deployment credentials out of logs and error text

pub mod atomic_write;
pub mod redact;

pub use atomic_write::{PersistMode, atomic_write, atomic_write_with_mode};
pub use redact::{REDACTED, SecretRedactor, collect_json_secrets, redact_json_secrets};
