use crate::error::Error;
use crate::paths::{default_home, Sandbox, HOME_ENV, SANDBOX_DIR_NAME};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default npm registry URL.
pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org/";
/// Default Python package index URL.
pub const DEFAULT_PYPI_URL: &str = "https://pypi.org/";
/// Default GitHub REST API URL.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com/";
/// Default GitHub web URL (source archives).
pub const DEFAULT_GITHUB_URL: &str = "https://github.com/";
/// Default number of packages installed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

pub const NPM_REGISTRY_ENV: &str = "CHAI_NPM_REGISTRY";
pub const PYPI_URL_ENV: &str = "CHAI_PYPI_URL";
pub const GITHUB_API_ENV: &str = "CHAI_GITHUB_API";
pub const GITHUB_URL_ENV: &str = "CHAI_GITHUB_URL";
pub const GITHUB_TOKEN_ENV: &str = "CHAI_GITHUB_TOKEN";
pub const CONCURRENCY_ENV: &str = "CHAI_CONCURRENCY";

/// Remote endpoints consumed by the registry adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub npm_registry: String,
    pub pypi: String,
    pub github_api: String,
    pub github_web: String,
    /// Sent as a bearer token to the GitHub API when set.
    pub github_token: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            npm_registry: DEFAULT_NPM_REGISTRY.to_string(),
            pypi: DEFAULT_PYPI_URL.to_string(),
            github_api: DEFAULT_GITHUB_API.to_string(),
            github_web: DEFAULT_GITHUB_URL.to_string(),
            github_token: None,
        }
    }
}

impl Endpoints {
    /// Point every adapter at one base URL (mock registries in tests).
    #[must_use]
    pub fn all_at(base: &str) -> Self {
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        Self {
            npm_registry: format!("{base}npm/"),
            pypi: format!("{base}pypi-root/"),
            github_api: format!("{base}gh-api/"),
            github_web: format!("{base}gh/"),
            github_token: None,
        }
    }
}

/// Runtime configuration for chai.
#[derive(Debug, Clone)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Sandbox root.
    pub home: PathBuf,

    pub endpoints: Endpoints,

    /// Maximum packages installed at once.
    pub concurrency: usize,
}

/// On-disk `config.json`; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigFile {
    npm_registry: Option<String>,
    pypi_url: Option<String>,
    github_api: Option<String>,
    github_url: Option<String>,
    github_token: Option<String>,
    concurrency: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            home: default_home().unwrap_or_else(|| PathBuf::from(SANDBOX_DIR_NAME)),
            endpoints: Endpoints::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Config {
    /// Create a config with defaults and the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Load configuration: defaults, then `<home>/config.json`, then environment.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or
    /// parsed, or if an environment override is invalid.
    pub fn load(cwd: PathBuf) -> Result<Self, Error> {
        Self::load_with(cwd, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable environment lookup.
    pub fn load_with(cwd: PathBuf, env: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::new(cwd);

        if let Some(home) = env(HOME_ENV).filter(|h| !h.is_empty()) {
            config.home = PathBuf::from(home);
        } else if default_home().is_none() && !config.home.is_absolute() {
            return Err(Error::HomeNotFound);
        }

        let file_path = config.sandbox().config_path();
        if let Some(file) = read_config_file(&file_path)? {
            config.apply_file(file);
        }

        config.apply_env(env)?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(url) = file.npm_registry {
            self.endpoints.npm_registry = url;
        }
        if let Some(url) = file.pypi_url {
            self.endpoints.pypi = url;
        }
        if let Some(url) = file.github_api {
            self.endpoints.github_api = url;
        }
        if let Some(url) = file.github_url {
            self.endpoints.github_web = url;
        }
        if file.github_token.is_some() {
            self.endpoints.github_token = file.github_token;
        }
        if let Some(n) = file.concurrency {
            self.concurrency = n.max(1);
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), Error> {
        if let Some(url) = env(NPM_REGISTRY_ENV) {
            self.endpoints.npm_registry = url;
        }
        if let Some(url) = env(PYPI_URL_ENV) {
            self.endpoints.pypi = url;
        }
        if let Some(url) = env(GITHUB_API_ENV) {
            self.endpoints.github_api = url;
        }
        if let Some(url) = env(GITHUB_URL_ENV) {
            self.endpoints.github_web = url;
        }
        if let Some(token) = env(GITHUB_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.endpoints.github_token = Some(token);
        }
        if let Some(raw) = env(CONCURRENCY_ENV) {
            let n: usize = raw.trim().parse().map_err(|_| Error::ConfigValue {
                key: CONCURRENCY_ENV,
                value: raw.clone(),
            })?;
            self.concurrency = n.max(1);
        }
        Ok(())
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set the sandbox root.
    #[must_use]
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Sandbox paths derived from `home`.
    #[must_use]
    pub fn sandbox(&self) -> Sandbox {
        Sandbox::new(self.home.clone())
    }
}

fn read_config_file(path: &Path) -> Result<Option<ConfigFile>, Error> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
}
