pub mod clean;
pub mod info;
pub mod install;
pub mod list;
pub mod version;

use chai_core::pkg::PkgError;
use miette::{IntoDiagnostic, MietteDiagnostic, Report, Result};
use serde::Serialize;

/// Print one JSON document on stdout.
pub fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(e) => eprintln!("error: failed to encode output: {e}"),
    }
}

/// Surface an engine error.
///
/// With `--json` the error is printed as `{ok:false,error:{code,message}}`
/// and the process exits with status 1; otherwise it becomes a diagnostic.
pub fn fail(err: PkgError, json: bool) -> Result<()> {
    if json {
        print_json(&serde_json::json!({
            "ok": false,
            "error": {
                "code": err.code(),
                "message": err.message(),
            }
        }));
        std::process::exit(1);
    }
    Err(diagnostic(&err))
}

pub fn diagnostic(err: &PkgError) -> Report {
    Report::new(MietteDiagnostic::new(err.message().to_string()).with_code(err.code()))
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().into_diagnostic()
}
