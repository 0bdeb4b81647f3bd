//! Project configuration: `conduit.yaml` plus values discovered from `go.mod`

use crate::hash::ContentHash;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "conduit.yaml";
pub const DEFAULT_GO_OUTPUT: &str = ".conduit/generated";
pub const FALLBACK_MODULE: &str = "app";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_name: String,
    pub server: ServerConfig,
    pub codegen: CodegenConfig,
    /// Extra glob patterns (relative to the project root) to skip.
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    pub go: OutputConfig,
    pub typescript: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_name: "conduit".to_string(),
            server: ServerConfig::default(),
            codegen: CodegenConfig::default(),
            exclude: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load `conduit.yaml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            debug!("No config file found, using defaults");
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Go output directory relative to the project root.
    pub fn go_output(&self) -> PathBuf {
        PathBuf::from(
            self.codegen
                .go
                .output
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_GO_OUTPUT),
        )
    }

    /// Output directories the walker and the watcher must never descend into.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.go_output()];
        if let Some(ts) = self.codegen.typescript.output.as_deref().filter(|s| !s.is_empty()) {
            dirs.push(PathBuf::from(ts));
        }
        dirs
    }

    pub fn hash(&self) -> ContentHash {
        match serde_json::to_vec(self) {
            Ok(bytes) => ContentHash::from_bytes(&bytes),
            Err(_) => ContentHash::default(),
        }
    }
}

/// Read the `module` directive of `<root>/go.mod`. Missing file or
/// directive yields the fallback module name.
pub fn module_name(root: &Path) -> String {
    let Ok(raw) = std::fs::read_to_string(root.join("go.mod")) else {
        return FALLBACK_MODULE.to_string();
    };
    raw.lines()
        .filter_map(|line| line.trim().strip_prefix("module"))
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(|rest| rest.trim().trim_matches('"').to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_MODULE.to_string())
}

/// Everything one generation run needs to know about the project.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub module_name: String,
    pub config: Config,
}

impl ProjectConfig {
    pub fn resolve(root: &Path) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("project root {} is not accessible", root.display()))?;
        let config = Config::load(&root)?;
        let module_name = module_name(&root);
        debug!("Project {} (module {})", root.display(), module_name);
        Ok(ProjectConfig {
            root,
            module_name,
            config,
        })
    }

    /// Go output directory relative to the root.
    pub fn output_rel(&self) -> PathBuf {
        self.config.go_output()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(self.output_rel())
    }

    pub fn output_dirs(&self) -> Vec<PathBuf> {
        self.config.output_dirs()
    }

    pub fn exclude_globs(&self) -> &[String] {
        &self.config.exclude
    }

    pub fn config_hash(&self) -> ContentHash {
        self.config.hash()
    }
}
