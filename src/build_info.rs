// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Build and version information module
//!
//! Minimal version metadata for the `--show-version` CLI flag. This
//! crate has no build script, so there is no git commit hash or build
//! timestamp to report — only the Cargo package version.

/// Build information available at runtime.
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Cargo package version.
    pub version: &'static str,
    /// Target triple the binary was compiled for.
    pub target_triple: &'static str,
    /// Build profile (debug/release).
    pub profile: &'static str,
}

impl BuildInfo {
    /// Get the current build information.
    pub fn get() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            target_triple: std::env::consts::ARCH,
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }

    /// Format complete build information for debug output.
    pub fn full_info(&self) -> String {
        format!(
            "Version: {}\nTarget: {}\nProfile: {}",
            self.version, self.target_triple, self.profile
        )
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version)
    }
}

/// Print version information to stdout.
pub fn print_version_info() {
    println!("{}", BuildInfo::get());
}

/// Print full build information to stdout.
pub fn print_build_info() {
    println!("{}", BuildInfo::get().full_info());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_reports_cargo_version() {
        let info = BuildInfo::get();
        assert!(!info.version.is_empty());
        assert!(info.profile == "debug" || info.profile == "release");
    }
}
