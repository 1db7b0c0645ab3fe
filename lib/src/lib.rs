//! # Kernel command line fixups for GRUB
//!
//! This crate ensures that the default kernel command line configured in the
//! GRUB defaults file carries `acpi_osi=!` and `acpi_osi="Windows 2009"`,
//! which work around firmware that misbehaves unless it believes it is
//! talking to Windows. The edit is idempotent, preserves the existing quoting,
//! and is preceded by a backup of the file.

// See https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![forbid(unused_must_use)]
#![deny(unsafe_code)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]

mod backup;
pub mod cli;
pub mod cmdline;
mod config;
mod edit;
pub mod errors;
mod task;
mod utils;
