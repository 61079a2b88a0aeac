//! Loop configuration.
//!
//! Settings can come from code (builder setters), from the environment
//! (`OTTER_UV_THREADPOOL_SIZE`), or from a TOML file with a `[loop]` table:
//!
//! ```toml
//! [loop]
//! threadpool_size = 8
//! thread_name = "fs-worker"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{UvError, UvResult};

/// Environment variable overriding [`LoopConfig::threadpool_size`].
pub const THREADPOOL_SIZE_ENV: &str = "OTTER_UV_THREADPOOL_SIZE";

/// Upper bound accepted for the worker pool.
pub const MAX_THREADPOOL_SIZE: usize = 1024;

/// Worker pool and thread naming for a [`Loop`](crate::Loop).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Number of threads executing filesystem syscalls.
    /// Default: 4
    pub threadpool_size: usize,

    /// Name given to worker threads.
    /// Default: "otter-uv-worker"
    pub thread_name: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            threadpool_size: 4,
            thread_name: "otter-uv-worker".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "loop")]
    event_loop: LoopConfig,
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with `OTTER_UV_THREADPOOL_SIZE` applied when set.
    pub fn from_env() -> UvResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Load the `[loop]` table of a TOML file. Missing keys keep defaults.
    pub fn load(path: &Path) -> UvResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| UvError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| UvError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.event_loop)
    }

    /// Apply environment overrides on top of the current values.
    pub fn with_env_overrides(mut self) -> UvResult<Self> {
        if let Ok(raw) = std::env::var(THREADPOOL_SIZE_ENV) {
            self.threadpool_size =
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| UvError::InvalidSetting {
                        name: THREADPOOL_SIZE_ENV,
                        value: raw.clone(),
                    })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Set the worker pool size.
    pub fn threadpool_size(mut self, size: usize) -> Self {
        self.threadpool_size = size;
        self
    }

    /// Set the worker thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn validate(&self) -> UvResult<()> {
        if self.threadpool_size == 0 || self.threadpool_size > MAX_THREADPOOL_SIZE {
            return Err(UvError::InvalidSetting {
                name: "threadpool_size",
                value: self.threadpool_size.to_string(),
            });
        }
        Ok(())
    }
}
