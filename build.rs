//! Build script for persona-pipeline
//!
//! Embeds the git commit, build timestamp and target triple so that
//! `persona-pipeline version` can report exactly what produced a run.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = git_output(&["rev-parse", "--short=8", "HEAD"]);
    let git_dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .map(|output| {
            if output.status.success() && !output.stdout.is_empty() {
                "true"
            } else {
                "false"
            }
        })
        .unwrap_or("unknown");

    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=PERSONA_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=PERSONA_GIT_DIRTY={}", git_dirty);
    println!("cargo:rustc-env=PERSONA_BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=PERSONA_TARGET={}", target);
    println!("cargo:rustc-env=PERSONA_PROFILE={}", profile);
}

/// Run a git command and return its trimmed stdout, or "unknown"
fn git_output(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
