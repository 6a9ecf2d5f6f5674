//! Plain-text templating of build scripts.
//!
//! Scripts carry a `VERSION=` line, a `BUILD_NUMBER=` line, and the app list as
//! double-quoted names. Nothing here parses shell; it only matches those patterns.

use std::sync::LazyLock;

use regex::Regex;

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\n]*)""#).expect("valid regex"));

/// `NAME=value` with a scalar value. `NAME=(` array assignments do not match.
static SCALAR_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?[A-Za-z_][A-Za-z0-9_]*=(?:[^(]|$)").expect("valid regex")
});

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^(\s*(?:export\s+)?VERSION=)(["']?)[^"'\s]*(["']?)"#).expect("valid regex")
});

static BUILD_NUMBER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^(\s*(?:export\s+)?BUILD_NUMBER=)(["']?)[^"'\s]*(["']?)"#)
        .expect("valid regex")
});

/// Collect every double-quoted token, in script order, without duplicates.
///
/// Values of scalar assignments (`VERSION="1.2.3"`) are not apps, and neither
/// are strings with shell expansions (`"building $app"`). Array assignments
/// and several names per line are fine: `APPS=("shop" "wallet")`.
pub fn extract_app_names(script: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in script.lines() {
        if SCALAR_ASSIGNMENT.is_match(line) {
            continue;
        }
        for token in QUOTED.captures_iter(line).filter_map(|c| c.get(1)) {
            let name = token.as_str().trim();
            if name.is_empty() || name.contains('$') || names.iter().any(|n| n == name) {
                continue;
            }
            names.push(name.to_string());
        }
    }
    names
}

/// Rewrite the first `VERSION=` and `BUILD_NUMBER=` assignments. Surrounding
/// quotes are preserved; a script without the markers comes back unchanged.
pub fn apply_version(script: &str, version_name: &str, build_number: u64) -> String {
    let with_version = VERSION_LINE.replace(script, |c: &regex::Captures| {
        format!("{}{}{}{}", &c[1], &c[2], version_name, &c[3])
    });
    BUILD_NUMBER_LINE
        .replace(&with_version, |c: &regex::Captures| {
            format!("{}{}{}{}", &c[1], &c[2], build_number, &c[3])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"#!/bin/bash
VERSION="1.0.0"
BUILD_NUMBER=1
APPS=(
  "shop"
  "wallet"
  "rider"
)
echo "building $VERSION"
"#;

    #[test]
    fn extracts_quoted_app_lines_in_order() {
        assert_eq!(extract_app_names(SCRIPT), vec!["shop", "wallet", "rider"]);
    }

    #[test]
    fn skips_assignment_values_and_expansions() {
        let script = "VERSION=\"2.0\"\nexport BUILD_NUMBER=\"7\"\necho \"building $app\"\n";
        assert!(extract_app_names(script).is_empty());
    }

    #[test]
    fn extracts_inline_array() {
        let script = "VERSION=1.0\nBUILD_NUMBER=1\nAPPS=(\"shop\" \"wallet\")\n";
        assert_eq!(extract_app_names(script), vec!["shop", "wallet"]);
    }

    #[test]
    fn extracts_several_names_per_line() {
        let script = "APPS=(\n  \"shop\" \"wallet\"\n  \"rider\", \"shop\"\n)\n";
        assert_eq!(extract_app_names(script), vec!["shop", "wallet", "rider"]);
    }

    #[test]
    fn extracts_shell_loop_list() {
        let script = "for app in \\\n  \"shop\" \\\n  \"wallet\"\ndo\n  echo \"$app\"\ndone\n";
        assert_eq!(extract_app_names(script), vec!["shop", "wallet"]);
    }

    #[test]
    fn rewrites_version_and_build_number() {
        let out = apply_version(SCRIPT, "1.2.4", 11);
        assert!(out.contains("VERSION=\"1.2.4\"\n"));
        assert!(out.contains("BUILD_NUMBER=11\n"));
        assert!(out.contains("echo \"building $VERSION\""));
        assert!(out.contains("  \"wallet\"\n"));
    }

    #[test]
    fn only_first_occurrence_is_rewritten() {
        let script = "VERSION=1\nVERSION=2\nBUILD_NUMBER=3\nBUILD_NUMBER=4\n";
        let out = apply_version(script, "9.9", 99);
        assert_eq!(out, "VERSION=9.9\nVERSION=2\nBUILD_NUMBER=99\nBUILD_NUMBER=4\n");
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let once = apply_version(SCRIPT, "3.1.0", 42);
        let twice = apply_version(&once, "3.1.0", 42);
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_markers_leave_script_untouched() {
        let script = "echo nothing to see\n";
        assert_eq!(apply_version(script, "1.0.1", 2), script);
    }

    #[test]
    fn app_version_is_not_a_version_marker() {
        let script = "APP_VERSION=5\nVERSION=1.0\n";
        assert_eq!(apply_version(script, "1.1", 2), "APP_VERSION=5\nVERSION=1.1\n");
    }
}
