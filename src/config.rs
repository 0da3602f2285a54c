//! Configuration file support

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use kubeterm_exec::{TerminalSize, default_shell_command};

/// Top-level configuration, loaded from an optional TOML file
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the WebSocket front end listens on
    pub listen: SocketAddr,

    /// Namespace to start in (derived from the cluster when unset)
    pub namespace: Option<String>,

    /// Kubeconfig context to switch to at startup (local mode only)
    pub context: Option<String>,

    /// Command run inside the container
    pub shell: Vec<String>,

    pub terminal: TerminalConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Rows before the client reports its size
    pub rows: u16,
    /// Columns before the client reports its size
    pub cols: u16,
    /// Maximum bytes of remote output per frame
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            namespace: None,
            context: None,
            shell: default_shell_command(),
            terminal: TerminalConfig::default(),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let size = TerminalSize::default();
        Self {
            rows: size.rows,
            cols: size.cols,
            chunk_size: 4096,
        }
    }
}

impl Config {
    /// Load from `path`, or return defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.namespace = config.namespace.filter(|ns| !ns.is_empty());
        config.context = config.context.filter(|ctx| !ctx.is_empty());
        ensure!(
            config.terminal.rows > 0 && config.terminal.cols > 0,
            "terminal rows and cols must be non-zero (got {}x{})",
            config.terminal.rows,
            config.terminal.cols
        );
        Ok(config)
    }

    pub fn initial_size(&self) -> TerminalSize {
        TerminalSize::new(self.terminal.rows, self.terminal.cols)
    }
}
