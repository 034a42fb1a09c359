use miette::Result;
use pkgfix_core::version::{version_string, FIXTURE_SCHEMA_VERSION, VERSION};

pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "version": VERSION,
                "fixture_schema_version": FIXTURE_SCHEMA_VERSION
            })
        );
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
