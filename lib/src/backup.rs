//! # Backups of the GRUB defaults file
//!
//! Every modification is preceded by a timestamped copy of the file. The very
//! first copy is additionally kept as `<name>.original` and never overwritten,
//! so the pre-tool state can always be restored.

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std;
use cap_std_ext::cap_std::fs::Dir;
use cap_std_ext::dirext::CapStdExtDirExt;
use chrono::{DateTime, NaiveDateTime, Utc};
use fn_error_context::context;

use crate::errors::Error;

const BACKUP_SUFFIX: &str = "bak";
const ORIGINAL_SUFFIX: &str = "original";
/// Sorts lexicographically in chronological order.
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";

/// Which backup to restore from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackupChoice {
    /// The copy taken before the first modification.
    Original,
    /// The most recent timestamped copy.
    Latest,
    /// A specific file in the backup directory.
    Named(String),
}

/// A directory holding backups of a single file.
#[derive(Debug)]
pub(crate) struct Backups {
    dir: Dir,
    path: Utf8PathBuf,
    basename: String,
}

impl Backups {
    /// Open (creating if necessary) the backup directory at `path`, for
    /// backups of a file named `basename`.
    #[context("Opening backup directory {path}")]
    pub(crate) fn open(path: &Utf8Path, basename: &str) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| Error::from_io(path, e))?;
        Self::open_optional(path, basename)?.ok_or_else(|| {
            Error::FileNotFound {
                path: path.to_owned(),
            }
            .into()
        })
    }

    /// Like [`Self::open`], but returns `None` if the directory does not exist.
    pub(crate) fn open_optional(path: &Utf8Path, basename: &str) -> Result<Option<Self>> {
        let dir = match Dir::open_ambient_dir(path, cap_std::ambient_authority()) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::from_io(path, e)),
        };
        Ok(Some(Self {
            dir,
            path: path.to_owned(),
            basename: basename.to_owned(),
        }))
    }

    fn original_name(&self) -> String {
        format!("{}.{ORIGINAL_SUFFIX}", self.basename)
    }

    /// Path of a backup within the directory, for display.
    pub(crate) fn path_of(&self, name: &str) -> Utf8PathBuf {
        self.path.join(name)
    }

    /// Store `contents` as a timestamped backup, and as the original backup
    /// if none exists yet. Both are verified present before returning.
    /// Returns the name of the timestamped backup.
    #[context("Creating backup")]
    pub(crate) fn create(&self, contents: &[u8], now: DateTime<Utc>) -> Result<String> {
        let name = format!(
            "{}.{}.{BACKUP_SUFFIX}",
            self.basename,
            now.format(TIMESTAMP_FORMAT)
        );
        self.write(&name, contents)?;
        let original = self.original_name();
        if !self.exists(&original)? {
            tracing::debug!("Saving original copy as {original}");
            self.write(&original, contents)?;
        }
        for n in [name.as_str(), original.as_str()] {
            anyhow::ensure!(self.exists(n)?, "Backup {} missing after write", self.path_of(n));
        }
        Ok(name)
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<()> {
        self.dir
            .atomic_write(name, contents)
            .map_err(|e| Error::from_io(&self.path_of(name), e))
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.dir
            .try_exists(name)
            .map_err(|e| Error::from_io(&self.path_of(name), e))
    }

    /// Parse the timestamp out of a backup name, if it is one of ours.
    /// Files of other targets sharing the directory (e.g. `grub.local`
    /// next to `grub`) do not parse.
    fn timestamp_of(&self, name: &str) -> Option<NaiveDateTime> {
        let mid = name
            .strip_prefix(self.basename.as_str())?
            .strip_prefix('.')?
            .strip_suffix(BACKUP_SUFFIX)?
            .strip_suffix('.')?;
        NaiveDateTime::parse_from_str(mid, TIMESTAMP_FORMAT).ok()
    }

    /// Timestamped backups, oldest first.
    #[context("Listing backups")]
    pub(crate) fn list(&self) -> Result<Vec<String>> {
        let mut r = Vec::new();
        for ent in self.dir.entries()? {
            let ent = ent?;
            let Ok(name) = ent.file_name().into_string() else {
                continue;
            };
            if self.timestamp_of(&name).is_some() {
                r.push(name);
            }
        }
        r.sort();
        Ok(r)
    }

    /// Whether the original backup is present.
    pub(crate) fn has_original(&self) -> Result<bool> {
        self.exists(&self.original_name())
    }

    /// Resolve a choice into the name of an existing backup.
    pub(crate) fn select(&self, choice: &BackupChoice) -> Result<String> {
        let name = match choice {
            BackupChoice::Original => self.original_name(),
            BackupChoice::Latest => match self.list()?.pop() {
                Some(name) => name,
                None => {
                    return Err(Error::FileNotFound {
                        path: self.path_of(&format!("{}.*.{BACKUP_SUFFIX}", self.basename)),
                    }
                    .into())
                }
            },
            BackupChoice::Named(name) => {
                // Only plain names inside the backup directory
                anyhow::ensure!(
                    !name.is_empty() && !name.contains('/') && name != "." && name != "..",
                    "Invalid backup name: {name}"
                );
                name.clone()
            }
        };
        if !self.exists(&name)? {
            return Err(Error::FileNotFound {
                path: self.path_of(&name),
            }
            .into());
        }
        Ok(name)
    }

    /// Read a backup's contents.
    pub(crate) fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.dir
            .read(name)
            .map_err(|e| Error::from_io(&self.path_of(name), e))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use similar_asserts::assert_eq;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn tmp_backups() -> Result<(tempfile::TempDir, Backups)> {
        let td = tempfile::tempdir()?;
        let path = Utf8Path::from_path(td.path())
            .ok_or_else(|| anyhow::anyhow!("non-UTF-8 tempdir"))?
            .join("backups");
        let b = Backups::open(&path, "grub")?;
        Ok((td, b))
    }

    #[test]
    fn test_create_and_list() -> Result<()> {
        let (_td, b) = tmp_backups()?;
        assert!(b.list()?.is_empty());
        assert!(!b.has_original()?);

        let first = b.create(b"v1\n", at(0))?;
        assert_eq!(first, "grub.20251009-085320.000.bak");
        assert!(b.has_original()?);
        let second = b.create(b"v2\n", at(61))?;

        assert_eq!(b.list()?, [first.clone(), second.clone()]);
        // The original is never replaced
        assert_eq!(b.read("grub.original")?, b"v1\n");
        assert_eq!(b.read(&second)?, b"v2\n");
        Ok(())
    }

    #[test]
    fn test_select() -> Result<()> {
        let (_td, b) = tmp_backups()?;
        let err = b.select(&BackupChoice::Original).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::FileNotFound { .. })
        ));
        let err = b.select(&BackupChoice::Latest).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::FileNotFound { .. })
        ));

        b.create(b"v1\n", at(0))?;
        let latest = b.create(b"v2\n", at(3600))?;
        assert_eq!(b.select(&BackupChoice::Original)?, "grub.original");
        assert_eq!(b.select(&BackupChoice::Latest)?, latest);
        assert_eq!(
            b.select(&BackupChoice::Named(latest.clone()))?,
            latest
        );
        assert!(b
            .select(&BackupChoice::Named("../passwd".into()))
            .is_err());
        assert!(b
            .select(&BackupChoice::Named("grub.nope.bak".into()))
            .is_err());
        Ok(())
    }

    #[test]
    fn test_open_optional() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = Utf8Path::from_path(td.path()).unwrap().join("missing");
        assert!(Backups::open_optional(&path, "grub")?.is_none());
        Backups::open(&path, "grub")?;
        assert!(Backups::open_optional(&path, "grub")?.is_some());
        Ok(())
    }

    #[test]
    fn test_list_ignores_unrelated() -> Result<()> {
        let (_td, b) = tmp_backups()?;
        b.dir.write("other.20250101-000000.000.bak", "x")?;
        b.dir.write("grub.original", "x")?;
        b.dir.write("grub.swp", "x")?;
        b.dir.write("grub.latest.bak", "x")?;
        assert!(b.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_shared_directory() -> Result<()> {
        let (_td, b) = tmp_backups()?;
        let local = Backups::open(&b.path, "grub.local")?;
        let ours = b.create(b"grub contents\n", at(0))?;
        let theirs = local.create(b"local contents\n", at(-3600))?;

        assert_eq!(b.list()?, [ours.clone()]);
        assert_eq!(local.list()?, [theirs]);
        let latest = b.select(&BackupChoice::Latest)?;
        assert_eq!(latest, ours);
        assert_eq!(b.read(&latest)?, b"grub contents\n");
        assert_eq!(b.read("grub.original")?, b"grub contents\n");
        Ok(())
    }
}
