//! Layered configuration loading with figment.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. programmatic defaults ([`ConfigLoader::merge`])
//! 3. the main file, `gantry.toml` (or `config.toml`, `gantry.yaml`, ...)
//! 4. the profile file next to it, e.g. `gantry.production.toml`
//! 5. `GANTRY_*` environment variables, `__` separating nested keys
//! 6. programmatic overrides ([`ConfigLoader::set`])
//!
//! ```text
//! GANTRY_LOGGING__LEVEL=debug              → logging.level = "debug"
//! GANTRY_SUPERVISOR__RELOAD_TIMEOUT_SECS=5 → supervisor.reload_timeout_secs = 5
//! GANTRY_APPS__ECHO__LISTEN=0.0.0.0:7000   → apps.echo.listen = "0.0.0.0:7000"
//! ```
//!
//! `GANTRY_PROFILE` selects the profile and is not mapped. TOML files need the
//! `toml-config` feature (on by default), YAML files `yaml-config`.
//!
//! Apps keep the order the files declare them in, main file first. Apps that
//! only environment variables or overrides introduce follow in key order.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::GantryConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GANTRY_";

/// Environment variable selecting the profile.
pub const PROFILE_ENV: &str = "GANTRY_PROFILE";

/// File names searched in every search path, in order. The first one found wins.
const FILE_NAMES: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "gantry.toml",
    #[cfg(feature = "toml-config")]
    "config.toml",
    #[cfg(feature = "yaml-config")]
    "gantry.yaml",
    #[cfg(feature = "yaml-config")]
    "gantry.yml",
    #[cfg(feature = "yaml-config")]
    "config.yaml",
];

/// Deployment profile, selecting `<stem>.<profile>.<ext>` overlay files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile(String);

impl Profile {
    /// Normalizes a profile name; `dev` and `prod` are accepted as abbreviations.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        Self(match name.as_str() {
            "dev" => "development".to_string(),
            "prod" => "production".to_string(),
            _ => name,
        })
    }

    /// Reads `GANTRY_PROFILE`, defaulting to `development`.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self("development".to_string())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads [`GantryConfig`] from every configured source.
///
/// The loader only describes sources; [`load`](Self::load) reads them afresh
/// each time, so a runtime keeps one loader and calls it on every reload.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    defaults: Figment,
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader reading the environment and, unless search paths are added,
    /// the current directory and the user config directory.
    pub fn new() -> Self {
        Self {
            defaults: Figment::new(),
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            file: None,
            env: true,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/gantry`.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("gantry")),
            None => self,
        }
    }

    /// Reads exactly this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Merges a whole configuration as programmatic defaults.
    ///
    /// Files and environment variables still override it.
    pub fn merge(mut self, config: GantryConfig) -> Self {
        self.defaults = self.defaults.merge(Serialized::defaults(config));
        self
    }

    /// Overrides a single dotted key after every other source.
    ///
    /// ```rust,ignore
    /// let config = ConfigLoader::new()
    ///     .set("apps.echo.listen", "127.0.0.1:0")
    ///     .load()?;
    /// ```
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    pub fn active_profile(&self) -> &Profile {
        &self.profile
    }

    /// Reads every source and extracts the configuration.
    pub fn load(&self) -> ConfigResult<GantryConfig> {
        let mut figment = Figment::from(Serialized::defaults(GantryConfig::default()))
            .merge(self.defaults.clone());

        let files = self.files()?;
        for path in &files {
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, path)?;
        }

        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["PROFILE"]).split("__"));
        }

        let mut config: GantryConfig = figment
            .merge(self.overrides.clone())
            .extract()
            .map_err(Box::new)?;
        config.apps = order_apps(std::mem::take(&mut config.apps), &declared_apps(&files));

        debug!(
            profile = %self.profile,
            logging_level = %config.logging.level,
            apps = config.apps.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// The files to merge, main file first, then its profile overlay.
    fn files(&self) -> ConfigResult<Vec<PathBuf>> {
        let main = match &self.file {
            Some(path) if path.exists() => path.clone(),
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => match self.discover() {
                Some(path) => path,
                None => {
                    debug!("No configuration file found, using defaults");
                    return Ok(Vec::new());
                }
            },
        };

        let overlay = profile_overlay(&main, &self.profile).filter(|p| p.exists());
        Ok(std::iter::once(main).chain(overlay).collect())
    }

    /// First known file name present in the search paths.
    fn discover(&self) -> Option<PathBuf> {
        let fallback;
        let search_paths = if self.search_paths.is_empty() {
            fallback = std::env::current_dir()
                .ok()
                .into_iter()
                .chain(dirs::config_dir().map(|dir| dir.join("gantry")))
                .collect::<Vec<_>>();
            &fallback
        } else {
            &self.search_paths
        };

        search_paths
            .iter()
            .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.exists())
    }
}

/// `dir/gantry.toml` → `dir/gantry.<profile>.toml`.
fn profile_overlay(main: &Path, profile: &Profile) -> Option<PathBuf> {
    let stem = main.file_stem()?.to_str()?;
    let ext = main.extension()?.to_str()?;
    Some(main.with_file_name(format!("{stem}.{profile}.{ext}")))
}

/// Merges one file, choosing the provider by extension.
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// App names in the order `files` declare them.
fn declared_apps(files: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in files.iter().flat_map(|path| file_apps(path)) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Keys of the `apps` table of one file, in document order.
///
/// The file was already parsed by figment; unreadable files yield nothing.
fn file_apps(path: &Path) -> Vec<String> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => toml::from_str::<toml::Table>(&text)
            .ok()
            .and_then(|doc| Some(doc.get("apps")?.as_table()?.keys().cloned().collect()))
            .unwrap_or_default(),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(&text)
            .ok()
            .and_then(|doc| {
                let apps = doc.get("apps")?.as_mapping()?;
                Some(apps.keys().filter_map(|k| k.as_str().map(str::to_string)).collect())
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Sorts `apps` into `declared` order; undeclared apps keep their relative
/// order at the end.
fn order_apps(apps: Map<String, Value>, declared: &[String]) -> Map<String, Value> {
    let mut entries: Vec<_> = apps.into_iter().collect();
    entries.sort_by_key(|(name, _)| {
        declared
            .iter()
            .position(|d| d == name)
            .unwrap_or(declared.len())
    });
    entries.into_iter().collect()
}
