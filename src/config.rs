use crate::error::{InspectError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const BACKEND_URL_ENV: &str = "PCB_INSPECT_BACKEND_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub timeout_seconds: u64,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub concurrency: usize,
    pub grid_columns: usize,
    /// セッション・キャッシュの保存先（未指定時はキャッシュディレクトリ）
    pub session_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".into(),
            timeout_seconds: 60,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            concurrency: 1,
            grid_columns: 3,
            session_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };

        // 環境変数を優先
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                config.backend_url = url;
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| InspectError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("pcb-inspect").join("config.json"))
    }

    pub fn session_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.session_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|d| d.join("pcb-inspect"))
            .ok_or_else(|| InspectError::Config("キャッシュディレクトリが見つかりません".into()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    pub fn set_backend_url(&mut self, url: String) -> Result<()> {
        let trimmed = url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(InspectError::Config(format!(
                "URLは http:// または https:// で始めてください: {}",
                url
            )));
        }
        self.backend_url = trimmed.to_string();
        self.save()
    }

    pub fn set_timeout(&mut self, seconds: u64) -> Result<()> {
        if seconds == 0 {
            return Err(InspectError::Config("タイムアウトは1秒以上を指定してください".into()));
        }
        self.timeout_seconds = seconds;
        self.save()
    }
}
