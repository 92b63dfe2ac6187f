use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::Browser;
use crate::error::{Error, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_SESSION_URL: &str = "https://browserbase.com/sessions/";

/// How long to wait after a remote run so the session recording is available.
pub const SESSION_SETTLE_DELAY: Duration = Duration::from_secs(10);

pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_path: Option<String>,
    /// CDP websocket endpoint of an already running browser. When set, the
    /// browser is connected to instead of launched.
    pub remote_endpoint: Option<String>,
    /// Timeout for page navigation (default: 30s).
    pub default_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            chrome_path: None,
            remote_endpoint: None,
            default_timeout: Duration::from_secs(30),
        }
    }
}

pub struct BrowserBuilder {
    config: BrowserConfig,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            config: BrowserConfig::default(),
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Connect to a running browser at the given CDP websocket URL.
    pub fn remote(mut self, endpoint: impl Into<String>) -> Self {
        self.config.remote_endpoint = Some(endpoint.into());
        self
    }

    /// Set the navigation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn build_config(self) -> BrowserConfig {
        self.config
    }

    pub async fn build(self) -> Result<Browser> {
        Browser::launch(self.build_config()).await
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a `.env` file into the process environment.
///
/// Without an explicit path, `.env` is searched for from the working directory
/// upwards and a missing file is not an error. An explicit path must exist.
/// Variables already set in the environment are left alone.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .map_err(|e| Error::ConfigError(format!("cannot load {}: {e}", path.display()))),
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(Error::ConfigError(format!("cannot load .env: {e}"))),
        },
    }
}

/// Where the browser session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote {
        endpoint: String,
        session_id: Option<String>,
    },
}

/// Settings read from the environment at startup.
///
/// Credentials and model selection are passed through to the LLM host
/// without interpretation.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub target: Target,
    pub session_url: String,
    pub ollama_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub chrome_path: Option<String>,
}

impl HarvestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let target = match get("HARVEST_ENV").as_deref().map(str::to_ascii_uppercase) {
            None => Target::Local,
            Some(env) if env == "LOCAL" => Target::Local,
            Some(env) if env == "REMOTE" || env == "BROWSERBASE" => {
                let endpoint = get("HARVEST_REMOTE_WS").ok_or_else(|| {
                    Error::ConfigError("HARVEST_REMOTE_WS is required when HARVEST_ENV=REMOTE".into())
                })?;
                Target::Remote {
                    endpoint,
                    session_id: get("HARVEST_SESSION_ID"),
                }
            }
            Some(other) => {
                return Err(Error::ConfigError(format!(
                    "unknown HARVEST_ENV {other:?}, expected LOCAL or REMOTE"
                )))
            }
        };

        Ok(Self {
            target,
            session_url: get("HARVEST_SESSION_URL").unwrap_or_else(|| DEFAULT_SESSION_URL.into()),
            ollama_url: get("OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
            model: get("HARVEST_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            api_key: get("HARVEST_API_KEY"),
            chrome_path: get("CHROME_PATH"),
        })
    }

    /// Browser builder matching this configuration.
    pub fn browser_builder(&self) -> BrowserBuilder {
        let mut builder = BrowserBuilder::new();
        if let Some(ref path) = self.chrome_path {
            builder = builder.chrome_path(path.as_str());
        }
        if let Target::Remote { ref endpoint, .. } = self.target {
            builder = builder.remote(endpoint.as_str());
        }
        builder
    }

    /// Recording link for a remote session, if one is known.
    pub fn session_recording_url(&self) -> Option<String> {
        match &self.target {
            Target::Remote {
                session_id: Some(id),
                ..
            } => Some(format!("{}{}", self.session_url, id)),
            _ => None,
        }
    }
}
