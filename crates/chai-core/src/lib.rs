#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Resolution and installation engine for chai.
//!
//! Turns identifiers such as `npm:chalk@^5`, `gh:user/repo` or `py:requests`
//! into installed, integrity-verified packages inside a sandbox store.

pub mod config;
pub mod error;
pub mod paths;
pub mod pkg;
pub mod version;

pub use config::{Config, Endpoints};
pub use error::Error;
pub use paths::Sandbox;
pub use version::VERSION;
