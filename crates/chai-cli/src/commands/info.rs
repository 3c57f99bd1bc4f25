//! `chai info` command implementation.

use super::{fail, print_json, runtime};
use chai_core::pkg::{load_manifest, Identifier, PackageManifest, PackageMetadata, PkgError, Registries};
use chai_core::Config;
use miette::Result;
use std::path::Path;

pub fn run(config: &Config, package: &str, json: bool) -> Result<()> {
    let local = config.cwd.join(package);
    if local.is_dir() {
        return match load_manifest(&local) {
            Ok(manifest) => {
                print_manifest(&local, &manifest, json);
                Ok(())
            }
            Err(e) => fail(e, json),
        };
    }

    match runtime()?.block_on(remote_metadata(config, package)) {
        Ok(meta) => {
            print_metadata(&meta, json);
            Ok(())
        }
        Err(e) => fail(e.with_subject(package.trim()), json),
    }
}

async fn remote_metadata(config: &Config, identifier: &str) -> Result<PackageMetadata, PkgError> {
    Identifier::parse(identifier)?;
    let registries = Registries::new(&config.endpoints)?;
    let registry = registries.select(identifier);
    let resolved = registry.resolve_identifier(identifier)?;
    registry
        .get_metadata(&resolved.name, resolved.range.as_deref())
        .await
}

fn print_manifest(dir: &Path, manifest: &PackageManifest, json: bool) {
    if json {
        print_json(&serde_json::json!({
            "ok": true,
            "path": dir,
            "manifest": manifest,
        }));
        return;
    }

    println!(
        "{}@{}",
        manifest.name.as_deref().unwrap_or("(unnamed)"),
        manifest.version.as_deref().unwrap_or("0.0.0")
    );
    println!("  path: {}", dir.display());
    if let Some(description) = &manifest.description {
        println!("  {description}");
    }
    if !manifest.dependencies.is_empty() {
        println!("  dependencies:");
        for (name, spec) in &manifest.dependencies {
            println!("    {name} {spec}");
        }
    }
    for (bin, path) in manifest.bin_map() {
        println!("  bin: {bin} -> {path}");
    }
}

fn print_metadata(meta: &PackageMetadata, json: bool) {
    if json {
        print_json(&serde_json::json!({ "ok": true, "metadata": meta }));
        return;
    }

    match &meta.version {
        Some(version) => println!("{}@{version}", meta.name),
        None => println!("{}", meta.name),
    }
    if let Some(description) = &meta.description {
        println!("  {description}");
    }
    if let Some(homepage) = &meta.homepage {
        println!("  homepage: {homepage}");
    }
    if let Some(url) = meta.repository.as_ref().and_then(|r| r.url()) {
        println!("  repository: {url}");
    }
    if let Some(keywords) = &meta.keywords {
        println!("  keywords: {}", keywords.join(", "));
    }
    if let Some(tarball) = meta.dist.as_ref().and_then(|d| d.tarball.as_deref()) {
        println!("  artifact: {tarball}");
    }
}
