//! Workspace style checks
//!
//! Walks every crate's `src/` and fails on the structural problems that
//! review keeps catching by hand.

use std::fs;
use std::path::{Path, PathBuf};

/// Non-test lines allowed per module
const MAX_MODULE_LINES: usize = 700;

/// Anti-pattern module names; use domain-specific names instead
const BANNED_MODULE_NAMES: &[&str] = &[
    "utils", "util", "helpers", "helper", "common", "shared", "misc", "tools",
];

/// Modules allowed to panic outside `#[cfg(test)]`
const PANIC_EXEMPT_MODULES: &[&str] = &["fixtures"];

#[derive(Debug)]
struct Violation {
    file: PathBuf,
    line: usize,
    rule: &'static str,
    message: String,
}

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn collect_sources(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_sources(&path, found);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            found.push(path);
        }
    }
}

fn workspace_sources() -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(workspace_root()) else {
        return found;
    };
    for entry in entries.flatten() {
        let crate_dir = entry.path();
        let is_member = crate_dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("seekstream-"));
        if is_member {
            collect_sources(&crate_dir.join("src"), &mut found);
        }
    }
    found.sort();
    found
}

/// Lines before the first `#[cfg(test)]`.
fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| line.trim() != "#[cfg(test)]")
        .collect()
}

fn check_file(path: &Path, violations: &mut Vec<Violation>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let production = production_lines(&content);

    if BANNED_MODULE_NAMES.contains(&stem) {
        violations.push(Violation {
            file: path.to_path_buf(),
            line: 1,
            rule: "BANNED_MODULE_NAME",
            message: format!("module '{stem}' uses a banned name"),
        });
    }

    if production.len() > MAX_MODULE_LINES {
        violations.push(Violation {
            file: path.to_path_buf(),
            line: 1,
            rule: "MODULE_SIZE_LIMIT",
            message: format!("{} non-test lines, limit is {MAX_MODULE_LINES}", production.len()),
        });
    }

    if PANIC_EXEMPT_MODULES.contains(&stem) {
        return;
    }
    for (index, line) in production.iter().enumerate() {
        let code = line.split("//").next().unwrap_or_default();
        if code.contains(".unwrap()") || code.contains(".expect(") {
            violations.push(Violation {
                file: path.to_path_buf(),
                line: index + 1,
                rule: "PANIC_IN_PRODUCTION",
                message: "propagate the error instead of unwrapping".to_string(),
            });
        }
    }
}

#[test]
fn test_workspace_style_has_no_violations() {
    let sources = workspace_sources();
    assert!(!sources.is_empty(), "no sources found under {}", workspace_root().display());

    let mut violations = Vec::new();
    for path in &sources {
        check_file(path, &mut violations);
    }

    for v in &violations {
        println!("[{}] {}:{} - {}", v.rule, v.file.display(), v.line, v.message);
    }
    assert!(
        violations.is_empty(),
        "found {} style violations in {} files",
        violations.len(),
        sources.len()
    );
}

#[test]
fn test_production_lines_stop_at_test_module() {
    let content = "fn a() {}\n\n#[cfg(test)]\nmod tests {\n    fn b() { x.unwrap(); }\n}\n";
    assert_eq!(production_lines(content), vec!["fn a() {}", ""]);
}
