pub mod read;
pub mod version;
pub mod write;

use std::fmt::Display;

/// Error code for a fixture file that cannot be read.
pub const FIXTURE_READ_FAILED: &str = "FIXTURE_READ_FAILED";

/// Report an error and exit with status 1.
///
/// In JSON mode the error goes to stdout as
/// `{"ok": false, "error": {"code", "message"}}`; otherwise it goes to
/// stderr.
pub fn fail(code: &str, message: impl Display, json: bool) -> ! {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": false,
                "error": {
                    "code": code,
                    "message": message.to_string()
                }
            })
        );
    } else {
        eprintln!("error[{code}]: {message}");
    }
    std::process::exit(1);
}

/// Report a core error and exit with status 1.
pub fn fail_with(err: &pkgfix_core::Error, json: bool) -> ! {
    fail(err.code(), err, json)
}
