use crate::catalog::CollectOptions;
use crate::context::OutputFormat;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOCAL_CONFIG: &str = ".cf-config.toml";
/// Per-project download fallback; part of the default ignore list
const LOCAL_DOWNLOADS: &str = ".cf-downloads";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfConfig {
    #[serde(default)]
    pub collect: CollectConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// [collect] section: what a scan picks up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectConfig {
    /// Substrings of relative paths to skip; directories are matched with a trailing `/`
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_true")]
    pub select_by_default: bool,
}

/// [output] section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Token estimate above which the status bar warns
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Where exports and write-back fallbacks land
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

/// [agent] section: the external command that reconstructs files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_cmd")]
    pub command: String,
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub split_diff: bool,
    #[serde(default = "default_true")]
    pub line_numbers: bool,
    #[serde(default = "default_tab_width")]
    pub tab_width: u8,
}

fn default_true() -> bool {
    true
}

fn default_ignore() -> Vec<String> {
    [
        ".git/",
        "node_modules/",
        "target/",
        "dist/",
        "build/",
        "__pycache__/",
        ".DS_Store",
        ".cf-downloads/",
    ]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_bytes() -> u64 {
    512 * 1024
}

fn default_token_budget() -> usize {
    128_000
}

fn default_tab_width() -> u8 {
    4
}

fn default_agent_cmd() -> String {
    "claude".into()
}

fn default_agent_args() -> Vec<String> {
    vec!["--print".into(), "-p".into(), "{prompt}".into()]
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            ignore: default_ignore(),
            max_file_bytes: default_max_file_bytes(),
            select_by_default: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            token_budget: default_token_budget(),
            download_dir: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_cmd(),
            args: default_agent_args(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            split_diff: false,
            line_numbers: true,
            tab_width: default_tab_width(),
        }
    }
}

impl CollectConfig {
    pub fn options(&self) -> CollectOptions {
        CollectOptions {
            ignore: self.ignore.clone(),
            max_file_bytes: self.max_file_bytes,
            select_by_default: self.select_by_default,
        }
    }
}

impl OutputConfig {
    /// Configured directory, else the user's downloads, else `.cf-downloads`
    /// under the project root. Never the project root itself.
    pub fn download_dir(&self, project_root: &Path) -> PathBuf {
        resolve_download_dir(self.download_dir.clone(), dirs::download_dir, project_root)
    }
}

fn resolve_download_dir(
    configured: Option<PathBuf>,
    user_downloads: impl FnOnce() -> Option<PathBuf>,
    project_root: &Path,
) -> PathBuf {
    configured
        .or_else(user_downloads)
        .unwrap_or_else(|| project_root.join(LOCAL_DOWNLOADS))
}

/// Load config by merging global defaults with per-project overrides.
/// Priority: per-project `.cf-config.toml` > global `~/.config/cf/config.toml` > built-in defaults.
/// Merging is deep: individual fields within sections (e.g. `[output]`) override independently.
pub fn load_config(project_root: &Path) -> CfConfig {
    let global_table = global_config_path().and_then(|p| read_table(&p));
    let local_table = read_table(&project_root.join(LOCAL_CONFIG));

    let merged = match (global_table, local_table) {
        (Some(mut global), Some(local)) => {
            deep_merge(&mut global, local);
            toml::Value::Table(global)
        }
        (Some(global), None) => toml::Value::Table(global),
        (None, Some(local)) => toml::Value::Table(local),
        (None, None) => return CfConfig::default(),
    };

    match merged.try_into() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Invalid config, using defaults: {}", e);
            CfConfig::default()
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cf").join("config.toml"))
}

fn read_table(path: &Path) -> Option<toml::map::Map<String, toml::Value>> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<toml::Value>(&content) {
        Ok(toml::Value::Table(t)) => Some(t),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Recursively merge `overlay` into `base`. Overlay values win; nested tables are merged recursively.
fn deep_merge(
    base: &mut toml::map::Map<String, toml::Value>,
    overlay: toml::map::Map<String, toml::Value>,
) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Save config to the global config dir (~/.config/cf/config.toml).
pub fn save_config(config: &CfConfig) -> Result<PathBuf> {
    let path = global_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    write_config(config, &path)?;
    Ok(path)
}

fn write_config(config: &CfConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
