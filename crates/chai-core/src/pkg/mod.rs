//! Package resolution and installation.
//!
//! - Parsing identifiers (`prefix:name@range`)
//! - Registry adapters for npm, PyPI, GitHub, system and native packages
//! - Resolving version ranges and dist-tags
//! - Streaming downloads with integrity verification
//! - Extracting archives into the sandbox store
//! - Walking dependency graphs, running post-install hooks
//! - Linking executables, recording installs in manifests and `chai.lock`

pub mod clean;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod hook;
pub mod ident;
pub mod install;
pub mod link;
pub mod lockfile;
pub mod manifest;
pub mod registry;
pub mod store;
pub mod version;

pub use clean::{clean, CleanOptions, CleanReport, CleanedDir};
pub use error::{codes as pkg_codes, PkgError};
pub use extract::extract_archive;
pub use fetch::{fetch_and_verify, Fetched};
pub use hook::run_postinstall;
pub use ident::Identifier;
pub use install::{
    HookFailure, InstallOptions, InstallReport, InstalledNode, Installer, NodeFailure, NodeStatus,
    PackageKey,
};
pub use link::{copy_strategy, link_binaries, resolve_bin_map, symlink_strategy, LinkReport};
pub use lockfile::{LockMeta, LockPackage, Lockfile, LOCKFILE_NAME, PKG_LOCK_SCHEMA_VERSION};
pub use manifest::{
    dependency_key, load_manifest, BinField, BinMap, ManifestSource, PackageManifest,
    ProjectManifest,
};
pub use registry::{
    Artifact, Dist, PackageMetadata, Registries, Registry, RegistryKind, Repository, ResolvedName,
};
pub use store::InstalledPackage;
pub use version::{pick_version, require_version, version_satisfies};
