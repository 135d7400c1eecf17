use std::path::{Path, PathBuf};

/// Platform-specific filesystem operations behind a common interface so
/// call sites stay free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Default root data directory.
    /// Unix: `~/.linkerx`, Windows: `%APPDATA%\linkerx`.
    fn default_data_dir() -> PathBuf;

    /// Root data directory, honouring `LINKERX_DATA_DIR`.
    fn data_dir() -> PathBuf {
        resolve_data_dir(Self::default_data_dir())
    }
}

/// `LINKERX_DATA_DIR` wins over the platform default when set and non-empty.
pub fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var_os("LINKERX_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
