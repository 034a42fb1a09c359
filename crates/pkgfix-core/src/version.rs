use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the fixture description format read and written by the CLI.
/// Bump this when a change would break existing fixture files.
pub const FIXTURE_SCHEMA_VERSION: u32 = 1;

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("pkgfix {VERSION}");

    if let Some(hash) = option_env!("PKGFIX_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }

    s
}
