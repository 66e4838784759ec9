use anyhow::{bail, Context, Result};
use candle_core::Device;
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::artifact::ArtifactStore;
use crate::model::source::DEFAULT_MAX_IMAGE_BYTES;
use crate::model::yolo::DetectParams;
use crate::model::{DeviceKind, HubZoo, UrlImageSource};
use crate::pipeline::{BackboneTable, Task, TaskProfile};

/// Redirects the model cache; the one process-wide storage setting.
pub const CACHE_DIR_ENV: &str = "GLANCE_CACHE_DIR";
pub const CONFIG_ENV: &str = "GLANCE_CONFIG";
pub const TASK_ENV: &str = "GLANCE_TASK";
pub const DEVICE_ENV: &str = "GLANCE_DEVICE";

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// On-disk configuration. Every field is optional.
#[derive(Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub cache_dir: Option<PathBuf>,
    pub task: Option<Task>,
    pub device: Option<DeviceKind>,
    pub mirror_url: Option<String>,
    /// Engine identity -> backbone.
    pub backbones: Option<BTreeMap<String, String>>,
    pub default_backbone: Option<String>,
    /// Required model engine.
    pub engine: Option<String>,
    pub filters: Option<BTreeMap<String, String>>,
    pub score_threshold: Option<f32>,
    pub nms_threshold: Option<f32>,
    pub max_image_bytes: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub listen: Option<String>,
}

pub fn load_config() -> Result<Config> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return load_config_from(Path::new(&path));
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(Config::default());
    };

    let config_path = config_dir.join("glance").join("config.toml");
    if !config_path.exists() {
        return Ok(Config::default());
    }
    load_config_from(&config_path)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    debug!("loaded config from {}", path.display());
    Ok(config)
}

/// Command-line overrides; they win over environment and file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub task: Option<Task>,
    pub device: Option<DeviceKind>,
    pub cache_dir: Option<PathBuf>,
}

/// Fully resolved startup configuration, built once per process.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache_dir: PathBuf,
    pub device: DeviceKind,
    pub profile: TaskProfile,
    pub mirror_url: Option<String>,
    pub detect: DetectParams,
    pub max_image_bytes: u64,
    pub fetch_timeout: Duration,
    pub download_timeout: Duration,
    pub listen: String,
}

impl Settings {
    pub fn from_env(config: Config, overrides: Overrides) -> Result<Self> {
        Self::resolve(config, |key| std::env::var(key).ok(), overrides)
    }

    /// Precedence: overrides, then environment, then file, then defaults.
    pub fn resolve<F>(config: Config, env: F, overrides: Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let cache_dir = match overrides.cache_dir {
            Some(dir) => dir,
            None => env(CACHE_DIR_ENV)
                .map(PathBuf::from)
                .or(config.cache_dir)
                .unwrap_or_else(|| std::env::temp_dir().join("glance_cache")),
        };

        let task = match overrides.task {
            Some(task) => task,
            None => match env(TASK_ENV) {
                Some(v) => v.parse().with_context(|| format!("{TASK_ENV}={v}"))?,
                None => config.task.unwrap_or_default(),
            },
        };

        let device = match overrides.device {
            Some(device) => device,
            None => match env(DEVICE_ENV) {
                Some(v) => v.parse().with_context(|| format!("{DEVICE_ENV}={v}"))?,
                None => config.device.unwrap_or_default(),
            },
        };

        let mut profile = TaskProfile::for_task(task);
        if config.backbones.is_some() || config.default_backbone.is_some() {
            let mut table = match (&profile.backbones, &config.backbones) {
                (_, Some(entries)) => entries.iter().fold(
                    BackboneTable::new(default_fallback(task)),
                    |table, (engine, backbone)| table.with(engine.clone(), backbone.clone()),
                ),
                (Some(table), None) => table.clone(),
                (None, None) => BackboneTable::new(default_fallback(task)),
            };
            if let Some(fallback) = config.default_backbone {
                table.set_fallback(fallback);
            }
            profile.backbones = Some(table);
        }
        if let Some(engine) = config.engine {
            profile.engine = Some(engine);
        }
        if let Some(filters) = config.filters {
            profile.filters.extend(filters);
        }

        let defaults = DetectParams::default();
        let detect = DetectParams {
            score_threshold: config.score_threshold.unwrap_or(defaults.score_threshold),
            nms_threshold: config.nms_threshold.unwrap_or(defaults.nms_threshold),
        };
        for (name, value) in [
            ("score_threshold", detect.score_threshold),
            ("nms_threshold", detect.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }

        Ok(Self {
            cache_dir,
            device,
            profile,
            mirror_url: config.mirror_url,
            detect,
            max_image_bytes: config.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs.unwrap_or(30)),
            download_timeout: Duration::from_secs(config.download_timeout_secs.unwrap_or(600)),
            listen: config.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
        })
    }

    /// Creates the cache directory. Must run before the first model
    /// resolution of the process.
    pub fn prepare_cache_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("creating cache directory {}", self.cache_dir.display()))?;
        info!("model cache at {}", self.cache_dir.display());
        Ok(())
    }

    pub fn hub_zoo(&self, device: &Device) -> HubZoo {
        let store = ArtifactStore::new(
            self.cache_dir.clone(),
            self.mirror_url.clone(),
            self.download_timeout,
        );
        HubZoo::new(store, device.clone(), self.detect)
    }

    pub fn image_source(&self) -> UrlImageSource {
        UrlImageSource::new(self.fetch_timeout, self.max_image_bytes)
    }
}

fn default_fallback(task: Task) -> &'static str {
    match task {
        Task::Detection => "yolov8m",
        Task::Classification => "resnet50",
    }
}
