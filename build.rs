// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=MEDIA_CAPTURE_VERSION");

    // Packagers without a git checkout set the version explicitly
    let version = std::env::var("MEDIA_CAPTURE_VERSION")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(git_version)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output without the leading `v`
///
/// "v0.2.0" stays "0.2.0"; "v0.2.0-3-gabc1234" becomes "0.2.0+3.abc1234".
fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let describe = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let describe = describe.strip_prefix('v').unwrap_or(&describe);

    let parts: Vec<&str> = describe.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [hash, commits, base] => {
            let hash = hash.strip_prefix('g').unwrap_or(hash);
            Some(format!("{}+{}.{}", base, commits, hash))
        }
        _ => Some(describe.to_string()),
    }
}
