//! Errors which callers may want to distinguish from generic failures.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// A failure to access the GRUB defaults file, its backups, or the
/// bootloader update command.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("File not found: {path}")]
    FileNotFound { path: Utf8PathBuf },
    #[error("Command not found: {command}")]
    ExternalCommandMissing { command: String },
}

impl Error {
    /// Classify an I/O error on `path`; kinds we don't model pass through as-is.
    pub(crate) fn from_io(path: &Utf8Path, err: std::io::Error) -> anyhow::Error {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.to_owned(),
            }
            .into(),
            std::io::ErrorKind::PermissionDenied => {
                Error::AccessDenied(format!("{path}: {err}")).into()
            }
            _ => anyhow::Error::new(err).context(format!("Accessing {path}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io() {
        let p = Utf8Path::new("/etc/default/grub");
        let e = Error::from_io(p, std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(
            e.downcast_ref::<Error>(),
            Some(Error::FileNotFound { path }) if path.as_path() == p
        ));
        let e = Error::from_io(
            p,
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::AccessDenied(_))));
        let e = Error::from_io(p, std::io::Error::from(std::io::ErrorKind::InvalidData));
        assert!(e.downcast_ref::<Error>().is_none());
        assert!(format!("{e:#}").starts_with("Accessing /etc/default/grub"));
    }
}
