//! # Configuration
//!
//! This module handles the optional TOML drop-in configuration, e.g.
//! `/etc/grub-acpi-osi/10-fedora.toml`. Values given on the command
//! line take precedence.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use serde::Deserialize;

use crate::cmdline::DEFAULT_BASE_TOKENS;

/// The GRUB defaults file we edit unless told otherwise.
pub(crate) const DEFAULT_TARGET: &str = "/etc/default/grub";
/// Where backups of the target are kept.
pub(crate) const DEFAULT_BACKUP_DIR: &str = "/var/backups/grub-acpi-osi";
/// Regenerates grub.cfg on Debian derivatives.
pub(crate) const DEFAULT_UPDATE_COMMAND: &[&str] = &["update-grub"];

const CONFIG_BASES: &[&str] = &["/usr/lib", "/etc", "/run"];
const CONFIG_DIR: &str = "grub-acpi-osi";

/// The toplevel config entry for configs stored in grub-acpi-osi/
#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct ConfigurationToplevel {
    pub(crate) config: Option<Configuration>,
}

/// The serialized [config] section
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename = "config", rename_all = "kebab-case")]
pub(crate) struct Configuration {
    /// Path to the GRUB defaults file
    pub(crate) target: Option<Utf8PathBuf>,
    /// Directory holding backups of the target
    pub(crate) backup_dir: Option<Utf8PathBuf>,
    /// Command (and arguments) which regenerates the bootloader configuration
    pub(crate) update_command: Option<Vec<String>>,
    /// Arguments written ahead of ours when the key is absent
    pub(crate) default_base_tokens: Option<Vec<String>>,
}

impl Configuration {
    /// Apply any values in other, overriding any existing values in `self`.
    fn merge(&mut self, other: Self) {
        fn mergeopt<T>(s: &mut Option<T>, o: Option<T>) {
            if let Some(o) = o {
                *s = Some(o);
            }
        }
        mergeopt(&mut self.target, other.target);
        mergeopt(&mut self.backup_dir, other.backup_dir);
        mergeopt(&mut self.update_command, other.update_command);
        mergeopt(&mut self.default_base_tokens, other.default_base_tokens);
    }

    pub(crate) fn target(&self) -> &Utf8Path {
        self.target
            .as_deref()
            .unwrap_or(Utf8Path::new(DEFAULT_TARGET))
    }

    pub(crate) fn backup_dir(&self) -> &Utf8Path {
        self.backup_dir
            .as_deref()
            .unwrap_or(Utf8Path::new(DEFAULT_BACKUP_DIR))
    }

    pub(crate) fn update_command(&self) -> Result<Vec<String>> {
        let cmd = match self.update_command.as_ref() {
            Some(cmd) => cmd.clone(),
            None => DEFAULT_UPDATE_COMMAND.iter().map(|&s| s.to_owned()).collect(),
        };
        anyhow::ensure!(!cmd.is_empty(), "update-command must not be empty");
        Ok(cmd)
    }

    pub(crate) fn default_base_tokens(&self) -> Vec<String> {
        match self.default_base_tokens.as_ref() {
            Some(v) => v.clone(),
            None => DEFAULT_BASE_TOKENS.iter().map(|&s| s.to_owned()).collect(),
        }
    }
}

/// Parse one drop-in, returning its `[config]` section (if any) and the
/// keys we didn't recognize.
fn parse_fragment(buf: &str) -> Result<(Option<Configuration>, Vec<String>)> {
    let mut unused = Vec::new();
    let de = toml::Deserializer::new(buf);
    let c: ConfigurationToplevel = serde_ignored::deserialize(de, |path| {
        unused.push(path.to_string());
    })?;
    Ok((c.config, unused))
}

/// Load the configuration, merging all found drop-ins in order.
/// Returns the defaults if no drop-in exists.
#[context("Loading configuration")]
pub(crate) fn load_config() -> Result<Configuration> {
    let fragments = liboverdrop::scan(CONFIG_BASES, CONFIG_DIR, &["toml"], true);
    let mut config = Configuration::default();
    for (_name, path) in fragments {
        let buf = std::fs::read_to_string(&path)?;
        let (c, unused) = parse_fragment(&buf).with_context(|| format!("Parsing {path:?}"))?;
        for key in unused {
            eprintln!("warning: {path:?}: Unknown key {key}");
        }
        if let Some(c) = c {
            tracing::debug!("Merging config from {path:?}: {c:?}");
            config.merge(c);
        }
    }
    Ok(config)
}
