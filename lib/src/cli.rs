//! # grub-acpi-osi CLI
//!
//! Command line tool to add `acpi_osi` kernel arguments to the GRUB defaults file.

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use std::ffi::OsString;

use crate::errors::Error;

/// Options selecting the file to edit and where its backups live.
#[derive(Debug, clap::Args)]
pub(crate) struct TargetOpts {
    /// Path to the GRUB defaults file; defaults to /etc/default/grub.
    #[clap(long, short = 'f')]
    pub(crate) file: Option<Utf8PathBuf>,

    /// Directory holding backups; defaults to /var/backups/grub-acpi-osi.
    #[clap(long)]
    pub(crate) backup_dir: Option<Utf8PathBuf>,
}

/// Add the arguments
#[derive(Debug, Parser)]
pub(crate) struct ApplyOpts {
    #[clap(flatten)]
    pub(crate) target: TargetOpts,

    /// Print the changes which would be made, without writing anything.
    ///
    /// This does not require root privileges.
    #[clap(long)]
    pub(crate) dry_run: bool,

    /// Don't regenerate the bootloader configuration afterwards.
    #[clap(long)]
    pub(crate) no_update: bool,

    /// Don't display progress
    #[clap(long)]
    pub(crate) quiet: bool,
}

/// Restore a backup
#[derive(Debug, Parser)]
pub(crate) struct RestoreOpts {
    #[clap(flatten)]
    pub(crate) target: TargetOpts,

    /// Restore this backup (a file name in the backup directory).
    #[clap(long, conflicts_with = "latest")]
    pub(crate) from: Option<String>,

    /// Restore the most recent timestamped backup instead of the original.
    #[clap(long)]
    pub(crate) latest: bool,

    /// Don't regenerate the bootloader configuration afterwards.
    #[clap(long)]
    pub(crate) no_update: bool,

    /// Don't display progress
    #[clap(long)]
    pub(crate) quiet: bool,
}

/// Display status
#[derive(Debug, Parser)]
pub(crate) struct StatusOpts {
    #[clap(flatten)]
    pub(crate) target: TargetOpts,

    /// Output in JSON format.
    #[clap(long)]
    pub(crate) json: bool,
}

/// Idempotently add `acpi_osi=!` and `acpi_osi="Windows 2009"` to the default
/// kernel command line.
///
/// The arguments are appended to `GRUB_CMDLINE_LINUX_DEFAULT` in the GRUB
/// defaults file, keeping its quoting style. The file is backed up before every
/// change, and the first backup is kept as the "original" for `restore`.
#[derive(Debug, Parser)]
#[clap(name = "grub-acpi-osi", version)]
#[clap(rename_all = "kebab-case")]
pub(crate) enum Opt {
    /// Add the arguments, then regenerate the bootloader configuration.
    ///
    /// If both arguments are already present, nothing is written.
    Apply(ApplyOpts),
    /// Restore the GRUB defaults file from a backup.
    ///
    /// By default this restores the copy taken before the first change.
    Restore(RestoreOpts),
    /// Display whether the arguments are present.
    Status(StatusOpts),
    /// List the available backups.
    ListBackups(TargetOpts),
}

/// Check that we are running as root.
pub(crate) fn require_root() -> Result<()> {
    let uid = rustix::process::getuid();
    if !uid.is_root() {
        return Err(Error::AccessDenied("This command requires root privileges".into()).into());
    }
    Ok(())
}

/// Parse the provided arguments and execute.
/// Calls [`clap::Error::exit`] on failure, printing the error message and aborting the program.
pub fn run_from_iter<I>(args: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    run_from_opt(Opt::parse_from(args))
}

/// Internal (non-generic/monomorphized) primary CLI entrypoint
fn run_from_opt(opt: Opt) -> Result<()> {
    match opt {
        Opt::Apply(opts) => crate::edit::apply(opts),
        Opt::Restore(opts) => crate::edit::restore(opts),
        Opt::Status(opts) => crate::edit::status(opts),
        Opt::ListBackups(opts) => crate::edit::list_backups(opts),
    }
}

#[test]
fn test_parse_apply_args() {
    let o = Opt::try_parse_from(["grub-acpi-osi", "apply", "--dry-run", "-f", "/tmp/grub"])
        .unwrap();
    let o = match o {
        Opt::Apply(o) => o,
        o => panic!("Expected apply opts, not {o:?}"),
    };
    assert!(o.dry_run);
    assert!(!o.no_update);
    assert_eq!(o.target.file.unwrap().as_str(), "/tmp/grub");
    assert!(o.target.backup_dir.is_none());
}

#[test]
fn test_parse_restore_args() {
    let o = Opt::try_parse_from([
        "grub-acpi-osi",
        "restore",
        "--latest",
        "--backup-dir",
        "/srv/b",
        "--no-update",
    ])
    .unwrap();
    let o = match o {
        Opt::Restore(o) => o,
        o => panic!("Expected restore opts, not {o:?}"),
    };
    assert!(o.latest);
    assert!(o.no_update);
    assert!(o.from.is_none());
    assert_eq!(o.target.backup_dir.unwrap().as_str(), "/srv/b");

    // --from and --latest are exclusive
    assert!(Opt::try_parse_from([
        "grub-acpi-osi",
        "restore",
        "--latest",
        "--from",
        "grub.original"
    ])
    .is_err());
}

#[test]
fn test_parse_misc_args() {
    let o = Opt::try_parse_from(["grub-acpi-osi", "status", "--json"]).unwrap();
    assert!(matches!(o, Opt::Status(StatusOpts { json: true, .. })));
    let o = Opt::try_parse_from(["grub-acpi-osi", "list-backups"]).unwrap();
    assert!(matches!(o, Opt::ListBackups(TargetOpts { file: None, .. })));
    assert!(Opt::try_parse_from(["grub-acpi-osi"]).is_err());
}
