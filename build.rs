// build.rs
use std::process::Command;

/// Resolve a build metadata value: an explicit environment variable wins,
/// otherwise ask git, otherwise fall back to "unknown".
fn metadata(env_key: &str, git_args: &[&str]) -> String {
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value.trim().to_string();
        }
    }

    Command::new("git")
        .args(git_args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let revision = metadata("GIT_REVISION", &["rev-parse", "--short", "HEAD"]);
    let branch = metadata("GIT_BRANCH", &["rev-parse", "--abbrev-ref", "HEAD"]);
    // Not taken from git: an unset BUILD_TIME leaves the build_time gauge at zero.
    let build_time = std::env::var("BUILD_TIME").unwrap_or_default();

    println!("cargo:rustc-env=PROBE_GIT_REVISION={revision}");
    println!("cargo:rustc-env=PROBE_GIT_BRANCH={branch}");
    println!("cargo:rustc-env=PROBE_BUILD_TIME={build_time}");

    println!("cargo:rerun-if-env-changed=GIT_REVISION");
    println!("cargo:rerun-if-env-changed=GIT_BRANCH");
    println!("cargo:rerun-if-env-changed=BUILD_TIME");
}
