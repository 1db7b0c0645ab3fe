//! # Editing the default kernel command line
//!
//! This module implements the one nontrivial piece of the tool: a pure
//! transformation over the lines of the GRUB defaults file (usually
//! `/etc/default/grub`) which ensures that the `GRUB_CMDLINE_LINUX_DEFAULT`
//! assignment carries the `acpi_osi` kernel arguments.
//!
//! Nothing here performs I/O; reading, backing up and writing the file
//! is handled by the caller.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// The shell variable whose value we edit.
pub const KEY: &str = "GRUB_CMDLINE_LINUX_DEFAULT";

/// Disables every OSI string built into the kernel.
pub const ACPI_OSI_DISABLE: &str = "acpi_osi=!";

/// Advertises Windows 7 to the firmware. The embedded quotes are escaped
/// because the value ends up inside a shell-quoted string.
pub const ACPI_OSI_WINDOWS_2009: &str = r#"acpi_osi=\"Windows 2009\""#;

/// Comment line written above an assignment we had to create.
pub const ADDED_COMMENT: &str = "# Added by grub-acpi-osi";

/// Arguments placed ahead of ours when the file has no assignment at all.
pub const DEFAULT_BASE_TOKENS: &[&str] = &["quiet", "splash"];

const DEFAULT_QUOTE: char = '"';

static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^(\s*{KEY}\s*=\s*)(.*)$")).unwrap());

/// One of the two kernel arguments this tool manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequiredToken {
    /// `acpi_osi=!`
    DisableOsi,
    /// `acpi_osi=\"Windows 2009\"`
    Windows2009,
}

impl RequiredToken {
    /// All managed arguments, in the order they are appended.
    pub const ALL: [RequiredToken; 2] = [RequiredToken::DisableOsi, RequiredToken::Windows2009];

    /// The literal token as written into the file.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredToken::DisableOsi => ACPI_OSI_DISABLE,
            RequiredToken::Windows2009 => ACPI_OSI_WINDOWS_2009,
        }
    }

    /// Whether the unescaped value already provides this argument.
    ///
    /// The Windows check looks for `acpi_osi` and `Windows 2009` independently,
    /// so e.g. `acpi_osi=Linux foo="Windows 2009"` counts as present. Tightening
    /// this would change which existing files we consider configured.
    fn is_present_in(&self, unescaped: &str) -> bool {
        match self {
            RequiredToken::DisableOsi => unescaped.contains(ACPI_OSI_DISABLE),
            RequiredToken::Windows2009 => {
                unescaped.contains("acpi_osi") && unescaped.contains("Windows 2009")
            }
        }
    }
}

impl std::fmt::Display for RequiredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parsed right hand side of the target assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentValue {
    /// Either `"` or `'`; unquoted values are normalized to `"`.
    pub quote: char,
    /// Whitespace separated arguments, in their original order.
    pub tokens: Vec<String>,
    /// The value with `\"` and `\'` collapsed, used for membership checks only.
    unescaped: String,
}

fn unescape(s: &str) -> String {
    s.replace(r#"\""#, "\"").replace(r"\'", "'")
}

/// Parse the raw text following `KEY=` (without its line terminator).
///
/// A value counts as quoted only if it starts and ends with the same quote
/// character; anything else is trimmed and treated as unquoted.
pub fn parse_value(raw: &str) -> AssignmentValue {
    let quoted = match raw.chars().next() {
        Some(q @ ('"' | '\'')) if raw.len() >= 2 && raw.ends_with(q) => {
            Some((q, &raw[1..raw.len() - 1]))
        }
        _ => None,
    };
    let (quote, inner) = quoted.unwrap_or((DEFAULT_QUOTE, raw.trim()));
    AssignmentValue {
        quote,
        tokens: inner.split_whitespace().map(ToOwned::to_owned).collect(),
        unescaped: unescape(inner),
    }
}

impl AssignmentValue {
    fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let tokens: Vec<String> = tokens.iter().map(|t| t.as_ref().to_owned()).collect();
        let unescaped = unescape(&tokens.join(" "));
        Self {
            quote: DEFAULT_QUOTE,
            tokens,
            unescaped,
        }
    }

    /// The managed arguments this value does not yet provide.
    pub fn missing_tokens(&self) -> Vec<RequiredToken> {
        RequiredToken::ALL
            .into_iter()
            .filter(|t| !t.is_present_in(&self.unescaped))
            .collect()
    }

    /// Append every missing managed argument; returns `true` if any was added.
    pub fn ensure_required(&mut self) -> bool {
        let missing = self.missing_tokens();
        if missing.is_empty() {
            return false;
        }
        self.tokens
            .extend(missing.into_iter().map(|t| t.as_str().to_owned()));
        self.unescaped = unescape(&self.tokens.join(" "));
        true
    }

    /// Serialize back into a quoted shell value.
    pub fn render(&self) -> String {
        let q = self.quote;
        format!("{q}{}{q}", self.tokens.join(" "))
    }
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Match a single (non-comment) line against the assignment pattern,
/// returning the prefix through `=` and the raw value.
fn match_assignment(line: &str) -> Option<(&str, &str)> {
    if is_comment(line) {
        return None;
    }
    let (body, _) = split_terminator(line);
    let caps = ASSIGNMENT.captures(body)?;
    let prefix = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str();
    Some((prefix, value))
}

/// Locate the first assignment of [`KEY`], returning its line index and parsed value.
pub fn find_assignment<S: AsRef<str>>(lines: &[S]) -> Option<(usize, AssignmentValue)> {
    lines.iter().enumerate().find_map(|(i, line)| {
        match_assignment(line.as_ref()).map(|(_, raw)| (i, parse_value(raw)))
    })
}

/// Rewrites the GRUB defaults file so that [`KEY`] carries both managed arguments.
#[derive(Debug, Clone)]
pub struct LineEditor {
    base_tokens: Vec<String>,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TOKENS)
    }
}

impl LineEditor {
    /// Create an editor which, when the key is missing entirely, writes
    /// `base_tokens` ahead of the managed arguments.
    pub fn new<S: AsRef<str>>(base_tokens: &[S]) -> Self {
        Self {
            base_tokens: base_tokens.iter().map(|t| t.as_ref().to_owned()).collect(),
        }
    }

    /// Apply the edit to a sequence of lines, each optionally carrying its terminator.
    ///
    /// Only the first assignment is rewritten; every other line is borrowed
    /// from the input unchanged. If there is no assignment, a comment and a
    /// fresh assignment are appended. In that case a last input line lacking
    /// a terminator gains `\n` (and becomes owned), so that the comment
    /// starts on its own line.
    pub fn apply<'a>(&self, lines: &[&'a str]) -> Vec<Cow<'a, str>> {
        let mut found = false;
        let mut out: Vec<Cow<'a, str>> = Vec::with_capacity(lines.len() + 2);
        for &line in lines {
            if found {
                out.push(Cow::Borrowed(line));
                continue;
            }
            let Some((prefix, raw)) = match_assignment(line) else {
                out.push(Cow::Borrowed(line));
                continue;
            };
            let mut value = parse_value(raw);
            value.ensure_required();
            let terminator = match split_terminator(line).1 {
                "" => "\n",
                t => t,
            };
            out.push(Cow::Owned(format!("{prefix}{}{terminator}", value.render())));
            found = true;
        }

        if !found {
            if let Some(last) = out.last_mut() {
                if !last.ends_with('\n') {
                    last.to_mut().push('\n');
                }
            }
            let mut value = AssignmentValue::from_tokens(&self.base_tokens);
            value.ensure_required();
            tracing::debug!("No {KEY} found, appending a new assignment");
            out.push(Cow::Owned(format!("{ADDED_COMMENT}\n")));
            out.push(Cow::Owned(format!("{KEY}={}\n", value.render())));
        }
        out
    }

    /// Like [`Self::apply`], but over the full contents of the file.
    pub fn apply_to_str(&self, contents: &str) -> String {
        let lines: Vec<&str> = contents.split_inclusive('\n').collect();
        self.apply(&lines).concat()
    }
}

/// Apply the edit with the default [`LineEditor`].
pub fn apply_tokens<'a>(lines: &[&'a str]) -> Vec<Cow<'a, str>> {
    LineEditor::default().apply(lines)
}

/// Apply the edit with the default [`LineEditor`] to full file contents.
pub fn apply_tokens_to_str(contents: &str) -> String {
    LineEditor::default().apply_to_str(contents)
}
