//! # Applying and reverting the edit on disk
//!
//! This composes the pure transformation in [`crate::cmdline`] with the
//! filesystem: read the target, back it up, rewrite it atomically, and
//! regenerate the bootloader configuration.

use std::borrow::Cow;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std;
use cap_std_ext::cap_std::fs::Dir;
use cap_std_ext::dirext::CapStdExtDirExt;
use chrono::{DateTime, Utc};
use fn_error_context::context;
use serde::Serialize;

use crate::backup::{BackupChoice, Backups};
use crate::cli::{ApplyOpts, RestoreOpts, StatusOpts, TargetOpts};
use crate::cmdline::{LineEditor, RequiredToken};
use crate::config::Configuration;
use crate::errors::Error;
use crate::task::Task;

/// Effective settings, after merging configuration and the command line.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) target: Utf8PathBuf,
    pub(crate) backup_dir: Utf8PathBuf,
    pub(crate) update_command: Vec<String>,
    pub(crate) base_tokens: Vec<String>,
}

impl Settings {
    pub(crate) fn new(config: &Configuration, opts: &TargetOpts) -> Result<Self> {
        let target = opts
            .file
            .clone()
            .unwrap_or_else(|| config.target().to_owned());
        let backup_dir = opts
            .backup_dir
            .clone()
            .unwrap_or_else(|| config.backup_dir().to_owned());
        Ok(Self {
            target,
            backup_dir,
            update_command: config.update_command()?,
            base_tokens: config.default_base_tokens(),
        })
    }

    fn load(opts: &TargetOpts) -> Result<Self> {
        let config = crate::config::load_config()?;
        Self::new(&config, opts)
    }

    fn open_target(&self) -> Result<TargetFile> {
        TargetFile::open(&self.target)
    }

    fn backups(&self, target: &TargetFile) -> Result<Backups> {
        Backups::open(&self.backup_dir, &target.name)
    }

    fn backups_optional(&self, target: &TargetFile) -> Result<Option<Backups>> {
        Backups::open_optional(&self.backup_dir, &target.name)
    }

    fn update_bootloader(&self, quiet: bool) -> Result<()> {
        let task = Task::from_argv(
            "Regenerating bootloader configuration",
            &self.update_command,
        )?;
        let task = if quiet { task.quiet() } else { task };
        task.run()
    }
}

/// The file being edited, opened via its parent directory.
#[derive(Debug)]
struct TargetFile {
    dir: Dir,
    name: String,
    path: Utf8PathBuf,
}

impl TargetFile {
    fn open(path: &Utf8Path) -> Result<Self> {
        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid target path: {path}"))?;
        let parent = path
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let dir = Dir::open_ambient_dir(parent, cap_std::ambient_authority())
            .map_err(|e| Error::from_io(path, e))?;
        Ok(Self {
            dir,
            name: name.to_owned(),
            path: path.to_owned(),
        })
    }

    fn read(&self) -> Result<String> {
        self.dir
            .read_to_string(&self.name)
            .map_err(|e| Error::from_io(&self.path, e))
    }

    /// Atomically replace the contents, keeping the existing permissions.
    fn write(&self, contents: &[u8]) -> Result<()> {
        let perms = self
            .dir
            .metadata(&self.name)
            .map_err(|e| Error::from_io(&self.path, e))?
            .permissions();
        self.dir
            .atomic_write_with_perms(&self.name, contents, perms)
            .map_err(|e| Error::from_io(&self.path, e))
    }
}

/// What [`apply_to`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApplyOutcome {
    /// Both arguments were already present.
    Unchanged,
    /// Changes were computed and printed but not written.
    DryRun,
    /// The file was rewritten after saving the named backup.
    Written { backup: String },
}

fn strip_terminator(s: &str) -> &str {
    s.trim_end_matches(['\r', '\n'])
}

/// Print the lines which differ between `old` and `new`.
fn print_changes(old: &[&str], new: &[Cow<str>]) {
    for (i, line) in new.iter().enumerate() {
        let line = strip_terminator(line);
        match old.get(i).map(|o| strip_terminator(o)) {
            Some(o) if o == line => {}
            Some(o) => {
                println!("-{o}");
                println!("+{line}");
            }
            None => println!("+{line}"),
        }
    }
}

/// Ensure the target carries both managed arguments. Does not run the
/// bootloader update command.
#[context("Editing {}", settings.target)]
pub(crate) fn apply_to(
    settings: &Settings,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<ApplyOutcome> {
    let target = settings.open_target()?;
    let contents = target.read()?;
    let lines: Vec<&str> = contents.split_inclusive('\n').collect();
    let editor = LineEditor::new(&settings.base_tokens);
    let new_lines = editor.apply(&lines);
    let new_contents = new_lines.concat();
    if new_contents == contents {
        tracing::debug!("No changes required for {}", settings.target);
        return Ok(ApplyOutcome::Unchanged);
    }
    if dry_run {
        print_changes(&lines, &new_lines);
        return Ok(ApplyOutcome::DryRun);
    }

    // The backup must exist before we touch the target
    let backups = settings.backups(&target)?;
    let backup = backups.create(contents.as_bytes(), now)?;
    tracing::debug!("Saved {}", backups.path_of(&backup));
    target.write(new_contents.as_bytes())?;
    Ok(ApplyOutcome::Written { backup })
}

/// Implementation of `grub-acpi-osi apply`.
pub(crate) fn apply(opts: ApplyOpts) -> Result<()> {
    if !opts.dry_run {
        crate::cli::require_root()?;
    }
    let settings = Settings::load(&opts.target)?;
    match apply_to(&settings, opts.dry_run, Utc::now())? {
        ApplyOutcome::Unchanged => {
            println!("{} is already configured", settings.target);
        }
        ApplyOutcome::DryRun => {
            println!("Dry run; {} not modified", settings.target);
        }
        ApplyOutcome::Written { backup } => {
            println!("Updated {} (backup: {backup})", settings.target);
            regenerate_or_warn(&settings, opts.no_update, opts.quiet)?;
        }
    }
    Ok(())
}

fn regenerate_or_warn(settings: &Settings, no_update: bool, quiet: bool) -> Result<()> {
    if no_update {
        crate::utils::medium_visibility_warning(&format!(
            "Bootloader configuration not regenerated; run `{}` for changes to take effect",
            settings.update_command.join(" ")
        ));
        Ok(())
    } else {
        settings.update_bootloader(quiet)
    }
}

/// Replace the target with a backup, after saving its current contents.
/// Returns the name of the backup that was restored.
#[context("Restoring {}", settings.target)]
pub(crate) fn restore_to(
    settings: &Settings,
    choice: &BackupChoice,
    now: DateTime<Utc>,
) -> Result<String> {
    let target = settings.open_target()?;
    let backups = settings
        .backups_optional(&target)?
        .ok_or_else(|| Error::FileNotFound {
            path: settings.backup_dir.clone(),
        })?;
    let name = backups.select(choice)?;
    let restored = backups.read(&name)?;
    match target.read() {
        Ok(current) => {
            let saved = backups.create(current.as_bytes(), now)?;
            tracing::debug!("Saved current contents as {saved}");
        }
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::FileNotFound { .. })) => {
            tracing::debug!("{} is missing, nothing to save", settings.target);
        }
        Err(e) => return Err(e),
    }
    if target.dir.try_exists(&target.name)? {
        target.write(&restored)?;
    } else {
        target
            .dir
            .atomic_write(&target.name, &restored)
            .map_err(|e| Error::from_io(&target.path, e))?;
    }
    Ok(name)
}

/// Implementation of `grub-acpi-osi restore`.
pub(crate) fn restore(opts: RestoreOpts) -> Result<()> {
    crate::cli::require_root()?;
    let settings = Settings::load(&opts.target)?;
    let choice = match (opts.from, opts.latest) {
        (Some(name), _) => BackupChoice::Named(name),
        (None, true) => BackupChoice::Latest,
        (None, false) => BackupChoice::Original,
    };
    let name = restore_to(&settings, &choice, Utc::now())?;
    println!("Restored {} from {name}", settings.target);
    regenerate_or_warn(&settings, opts.no_update, opts.quiet)
}

/// The state of the target, as reported by `grub-acpi-osi status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Status {
    pub(crate) path: Utf8PathBuf,
    pub(crate) key_present: bool,
    pub(crate) missing: Vec<RequiredToken>,
    pub(crate) configured: bool,
    pub(crate) original_backup: bool,
}

#[context("Querying status of {}", settings.target)]
pub(crate) fn status_of(settings: &Settings) -> Result<Status> {
    let target = settings.open_target()?;
    let contents = target.read()?;
    let lines: Vec<&str> = contents.split_inclusive('\n').collect();
    let (key_present, missing) = match crate::cmdline::find_assignment(&lines) {
        Some((_, value)) => (true, value.missing_tokens()),
        None => (false, RequiredToken::ALL.to_vec()),
    };
    let original_backup = match settings.backups_optional(&target)? {
        Some(b) => b.has_original()?,
        None => false,
    };
    Ok(Status {
        path: settings.target.clone(),
        key_present,
        configured: missing.is_empty(),
        missing,
        original_backup,
    })
}

/// Implementation of `grub-acpi-osi status`.
pub(crate) fn status(opts: StatusOpts) -> Result<()> {
    let settings = Settings::load(&opts.target)?;
    let status = status_of(&settings)?;
    if opts.json {
        serde_json::to_writer_pretty(std::io::stdout().lock(), &status)?;
        println!();
        return Ok(());
    }
    println!("File: {}", status.path);
    if !status.key_present {
        println!("{} is not set", crate::cmdline::KEY);
    }
    if status.configured {
        println!("Configured: yes");
    } else {
        println!("Configured: no");
        for t in status.missing.iter() {
            println!("  missing: {t}");
        }
    }
    let original = if status.original_backup {
        "present"
    } else {
        "none"
    };
    println!("Original backup: {original}");
    Ok(())
}

/// Names of the backups of the target: the original first (if present),
/// then the timestamped ones, oldest first.
fn backup_names(settings: &Settings) -> Result<Vec<String>> {
    let target = settings.open_target()?;
    let Some(backups) = settings.backups_optional(&target)? else {
        return Ok(Vec::new());
    };
    let mut r = Vec::new();
    if backups.has_original()? {
        r.push(backups.select(&BackupChoice::Original)?);
    }
    r.extend(backups.list()?);
    Ok(r)
}

/// Implementation of `grub-acpi-osi list-backups`.
pub(crate) fn list_backups(opts: TargetOpts) -> Result<()> {
    let settings = Settings::load(&opts)?;
    let names = backup_names(&settings)?;
    if names.is_empty() {
        println!("No backups in {}", settings.backup_dir);
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}
