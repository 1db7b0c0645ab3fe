//! Property tests for the GRUB command line editor.

use std::borrow::Cow;

use grub_acpi_osi_lib::cmdline::{
    apply_tokens, apply_tokens_to_str, find_assignment, LineEditor, RequiredToken, KEY,
};
use indoc::indoc;
use similar_asserts::assert_eq;

/// A spread of inputs seen in the wild, plus some malformed ones.
const CASES: &[&str] = &[
    "",
    "\n",
    "GRUB_TIMEOUT=5",
    indoc! {r#"
        # If you change this file, run 'update-grub' afterwards to update
        # /boot/grub/grub.cfg.
        GRUB_DEFAULT=0
        GRUB_TIMEOUT_STYLE=hidden
        GRUB_TIMEOUT=0
        GRUB_DISTRIBUTOR=`lsb_release -i -s 2> /dev/null || echo Debian`
        GRUB_CMDLINE_LINUX_DEFAULT="quiet splash"
        GRUB_CMDLINE_LINUX=""
    "#},
    "GRUB_CMDLINE_LINUX_DEFAULT='quiet acpi_osi=!'\n",
    "GRUB_CMDLINE_LINUX_DEFAULT=quiet\n",
    "GRUB_CMDLINE_LINUX_DEFAULT=\"\"\n",
    "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash'\n",
    "\tGRUB_CMDLINE_LINUX_DEFAULT =  \"nomodeset   quiet\"\r\n",
    "#GRUB_CMDLINE_LINUX_DEFAULT=\"quiet\"\nGRUB_CMDLINE_LINUX=\"\"",
    "GRUB_CMDLINE_LINUX_DEFAULT=\"acpi_osi=Linux\"\nGRUB_CMDLINE_LINUX_DEFAULT=\"quiet\"\n",
    r#"GRUB_CMDLINE_LINUX_DEFAULT="quiet acpi_osi=! acpi_osi=\"Windows 2009\"""#,
];

fn lines(s: &str) -> Vec<&str> {
    s.split_inclusive('\n').collect()
}

#[test]
fn idempotent() {
    for &case in CASES {
        let once = apply_tokens_to_str(case);
        let twice = apply_tokens_to_str(&once);
        assert_eq!(once, twice, "input: {case:?}");
    }
}

#[test]
fn tokens_present() {
    for &case in CASES {
        let out = apply_tokens_to_str(case);
        let (_, value) = find_assignment(&lines(&out)).expect("assignment");
        assert!(value.missing_tokens().is_empty(), "input: {case:?}");
        let rendered = value.render().replace(r#"\""#, "\"");
        assert!(rendered.contains("acpi_osi=!"));
        assert!(rendered.contains("acpi_osi") && rendered.contains("Windows 2009"));
    }
}

#[test]
fn line_count_delta() {
    for &case in CASES {
        let input = lines(case);
        let output = apply_tokens(&input);
        let expected = match find_assignment(&input) {
            Some(_) => input.len(),
            None => input.len() + 2,
        };
        assert_eq!(output.len(), expected, "input: {case:?}");
    }
}

#[test]
fn only_target_line_changes() {
    for &case in CASES {
        let input = lines(case);
        let output = apply_tokens(&input);
        let target = find_assignment(&input).map(|(i, _)| i);
        for (i, (a, b)) in input.iter().zip(output.iter()).enumerate() {
            if Some(i) == target {
                continue;
            }
            // The last line may gain a terminator before appended lines
            if target.is_none() && i + 1 == input.len() {
                assert_eq!(a.trim_end_matches('\n'), b.trim_end_matches('\n'));
                continue;
            }
            assert_eq!(*a, &**b, "input: {case:?}");
            assert!(matches!(b, Cow::Borrowed(_)));
        }
    }
}

#[test]
fn quote_style_preserved() {
    let out = apply_tokens_to_str("GRUB_CMDLINE_LINUX_DEFAULT='quiet'\n");
    let (_, value) = find_assignment(&lines(&out)).unwrap();
    assert_eq!(value.quote, '\'');
    assert!(out.starts_with("GRUB_CMDLINE_LINUX_DEFAULT='quiet "));
    assert!(out.ends_with("'\n"));
}

#[test]
fn no_duplicates() {
    let patched = apply_tokens_to_str("GRUB_CMDLINE_LINUX_DEFAULT=\"acpi_osi=! quiet\"\n");
    assert_eq!(patched.matches("acpi_osi=!").count(), 1);
    assert_eq!(patched.matches("Windows 2009").count(), 1);
}

#[test]
fn scenarios() {
    assert_eq!(
        apply_tokens_to_str(r#"GRUB_CMDLINE_LINUX_DEFAULT="quiet splash""#),
        "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash acpi_osi=! acpi_osi=\\\"Windows 2009\\\"\"\n"
    );
    let out = apply_tokens_to_str("GRUB_DEFAULT=0\n");
    let out: Vec<_> = out.lines().collect();
    assert_eq!(out.len(), 3);
    assert!(out[1].starts_with('#'));
    assert_eq!(
        out[2],
        format!("{KEY}=\"quiet splash acpi_osi=! acpi_osi=\\\"Windows 2009\\\"\"")
    );
    assert_eq!(
        apply_tokens_to_str("GRUB_CMDLINE_LINUX_DEFAULT='quiet acpi_osi=!'\n"),
        "GRUB_CMDLINE_LINUX_DEFAULT='quiet acpi_osi=! acpi_osi=\\\"Windows 2009\\\"'\n"
    );
    let done = "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash acpi_osi=! acpi_osi=\\\"Windows 2009\\\"\"\n";
    assert_eq!(apply_tokens_to_str(done), done);
}

#[test]
fn editor_without_base_tokens() {
    let out = LineEditor::new::<String>(&[]).apply_to_str("");
    let (_, value) = find_assignment(&lines(&out)).unwrap();
    let expected = RequiredToken::ALL.map(|t| t.as_str()).join(" ");
    assert_eq!(value.render(), format!("\"{expected}\""));
}
