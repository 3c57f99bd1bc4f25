use super::print_json;
use chai_core::Config;
use miette::{IntoDiagnostic, Result};

pub fn run(config: &Config, json: bool) -> Result<()> {
    let installed = config.sandbox().list_installed().into_diagnostic()?;

    if json {
        print_json(&serde_json::json!({ "ok": true, "packages": installed }));
    } else if installed.is_empty() {
        println!("No packages installed.");
    } else {
        for pkg in &installed {
            println!("{}:{}@{}", pkg.kind.prefix(), pkg.name, pkg.version);
        }
    }
    Ok(())
}
