//! `chai install` command implementation.

use super::{fail, print_json, runtime};
use chai_core::paths::project_root;
use chai_core::pkg::{
    InstallOptions, InstallReport, Installer, NodeStatus, PkgError, Registries, RegistryKind,
};
use chai_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::str::FromStr;

/// Parsed `install` arguments.
#[derive(Debug, Clone)]
pub struct InstallAction {
    pub identifier: String,
    pub from: Option<String>,
    pub dry_run: bool,
    pub persist: bool,
    pub link: bool,
    pub best_effort: bool,
    pub run_hooks: bool,
}

#[derive(Serialize)]
struct InstallOutput<'a> {
    ok: bool,
    #[serde(flatten)]
    report: &'a InstallReport,
}

pub fn run(config: &Config, action: InstallAction, json: bool) -> Result<()> {
    let identifier = match effective_identifier(&action.identifier, action.from.as_deref()) {
        Ok(identifier) => identifier,
        Err(e) => return fail(e, json),
    };

    let sandbox = config.sandbox();
    sandbox.ensure_dirs().into_diagnostic()?;
    let registries = match Registries::new(&config.endpoints) {
        Ok(registries) => registries,
        Err(e) => return fail(e, json),
    };

    let options = InstallOptions {
        dry_run: action.dry_run,
        persist: action.persist,
        link: action.link,
        best_effort: action.best_effort,
        run_hooks: action.run_hooks,
        concurrency: config.concurrency,
        project_dir: project_root(&config.cwd),
    };
    let installer = Installer::new(&registries, &sandbox, options);

    let result = runtime()?.block_on(installer.install(&identifier));
    let report = match result {
        Ok(report) => report,
        Err(e) => return fail(e, json),
    };

    if json {
        print_json(&InstallOutput {
            ok: report.is_success(),
            report: &report,
        });
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Apply `--from`: the named source replaces whatever prefix the identifier has.
fn effective_identifier(identifier: &str, from: Option<&str>) -> Result<String, PkgError> {
    let identifier = identifier.trim();
    let Some(from) = from else {
        return Ok(identifier.to_string());
    };

    let kind = RegistryKind::from_str(from.trim())?;
    let rest = match RegistryKind::of_identifier(identifier) {
        Some(current) => current.strip_own_prefix(identifier),
        None => identifier,
    };
    Ok(format!("{}:{rest}", kind.prefix()))
}

fn print_report(report: &InstallReport) {
    for node in &report.nodes {
        let marker = match node.status {
            NodeStatus::Installed => "+",
            NodeStatus::Reused => "=",
            NodeStatus::Recorded => "*",
            NodeStatus::Resolved => "?",
        };
        let indent = "  ".repeat(node.depth);
        println!("{indent}{marker} {}", node.key);
    }

    if report.dry_run {
        println!("Dry run: nothing was downloaded.");
    } else {
        let installed = report.with_status(NodeStatus::Installed).count();
        let reused = report.with_status(NodeStatus::Reused).count();
        println!("{installed} installed, {reused} already present");
    }

    for bin in &report.bins {
        println!("linked {bin}");
    }
    for failure in &report.hook_failures {
        eprintln!("warning: postinstall for {} failed: {}", failure.package, failure.message);
    }
    for failure in &report.failures {
        eprintln!("error: {} [{}]", failure.message, failure.code);
    }
}
