use std::process::Command;

/// Packaged source trees have no `.git`, so a release pipeline can pass the
/// revision in through this variable instead.
const REVISION_OVERRIDE: &str = "TRAILER_REVISION";

fn main() {
    println!("cargo:rerun-if-env-changed={REVISION_OVERRIDE}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");

    let revision = std::env::var(REVISION_OVERRIDE)
        .ok()
        .filter(|r| !r.trim().is_empty())
        .or_else(describe_worktree)
        .unwrap_or_default();

    println!("cargo:rustc-env=GIT_HASH={}", revision.trim());
}

/// Short commit id, suffixed with `-dirty` when the worktree has edits.
fn describe_worktree() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10", "--exclude", "*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}
