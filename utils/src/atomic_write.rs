//! Atomic file write helpers.
//!
//! Writes go to a temp file in the destination directory which is then renamed
//! over the target, so readers never observe a half-written report or config.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Allow the file to inherit the default umask.
    #[default]
    Default,
    /// Owner-only read/write (0o600 on Unix). Used for files holding credentials.
    SensitiveOwnerOnly,
}

impl PersistMode {
    #[cfg(unix)]
    fn mode(self) -> Option<u32> {
        match self {
            Self::Default => None,
            Self::SensitiveOwnerOnly => Some(0o600),
        }
    }
}

pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with_mode(path, bytes, PersistMode::Default)
}

pub fn atomic_write_with_mode(
    path: impl AsRef<Path>,
    bytes: &[u8],
    mode: PersistMode,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    // Tighten before any bytes land on disk.
    #[cfg(unix)]
    if let Some(mode) = mode.mode() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    }

    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if let Err(err) = tmp.persist(path) {
        tracing::debug!(path = %path.display(), "Atomic rename failed: {}", err.error);
        return Err(err.error);
    }

    #[cfg(unix)]
    if let Some(mode) = mode.mode() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }

    Ok(())
}
