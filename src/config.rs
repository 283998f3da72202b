use anyhow::Context as _;
use anyhow::Result;
use humantime::Duration;
use serde::Deserialize;
use serde_with::serde_as;
use serde_with::DisplayFromStr;
use serde_yaml;
use std::fs::File;
use std::path::Path;
use crate::fs::FsOptions;
use crate::fs::ListingPolicy;

pub const CONFIG_FILE: &str = "hostsys.yml";

pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(config)
}

/// Loads `path` if given, else `hostsys.yml` in `dir` when present, else
/// the defaults.
pub fn load_or_default<P: AsRef<Path>>(path: Option<&Path>, dir: P) -> Result<Config> {
    if let Some(path) = path {
        return load(path);
    }
    let path = dir.as_ref().join(CONFIG_FILE);
    if path.is_file() {
        return load(&path);
    }
    tracing::debug!(?path, "no config file, using defaults");
    Ok(Config::default())
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub create_dir: CreateDirConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bench: BenchConfig,
}

impl Config {
    pub fn fs_options(&self) -> FsOptions {
        FsOptions {
            listing: self.listing.hidden,
            dir_mode: self.create_dir.mode,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ListingConfig {
    #[serde(default)]
    pub hidden: ListingPolicy,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CreateDirConfig {
    #[serde(default = "CreateDirConfig::default_mode")]
    pub mode: u32,
}

impl CreateDirConfig {
    fn default_mode() -> u32 {
        0o777
    }
}

impl Default for CreateDirConfig {
    fn default() -> Self {
        Self {
            mode: Self::default_mode(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Text
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format {:?}", s)),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "BenchConfig::default_interval")]
    pub interval: Duration,
}

impl BenchConfig {
    fn default_interval() -> Duration {
        std::time::Duration::from_millis(100).into()
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            interval: Self::default_interval(),
        }
    }
}
