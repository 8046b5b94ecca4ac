use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Where the video catalog comes from — an https:// URL or a local file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Video cued (paused) when the player window opens.
    #[serde(default = "default_initial_video_id")]
    pub initial_video_id: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// URL handed to the player for a video id.  `{id}` is substituted.
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

/// Localised strings shown on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_song_label_prefix")]
    pub song_label_prefix: String,
    #[serde(default = "default_chapter_placeholder")]
    pub chapter_placeholder: String,
    #[serde(default = "default_invalid_pick_message")]
    pub invalid_pick_message: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source: default_catalog_source(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_video_id: default_initial_video_id(),
            width: default_width(),
            height: default_height(),
            url_template: default_url_template(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            song_label_prefix: default_song_label_prefix(),
            chapter_placeholder: default_chapter_placeholder(),
            invalid_pick_message: default_invalid_pick_message(),
        }
    }
}

fn default_catalog_source() -> String {
    "./videos.json".to_string()
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_initial_video_id() -> String {
    "T7CYthEK67Y".to_string()
}

fn default_width() -> u32 {
    900
}

fn default_height() -> u32 {
    500
}

fn default_url_template() -> String {
    "https://www.youtube.com/watch?v={id}".to_string()
}

fn default_song_label_prefix() -> String {
    "現在の楽曲：".to_string()
}

fn default_chapter_placeholder() -> String {
    "歌枠を選んだら曲も選んでくれよな！".to_string()
}

fn default_invalid_pick_message() -> String {
    "無効な動画またはタイムスタンプです。".to_string()
}

impl PlayerConfig {
    pub fn video_url(&self, video_id: &str) -> String {
        self.url_template.replace("{id}", video_id)
    }

    /// Inverse of [`video_url`](Self::video_url): recover the id from a URL
    /// the player reports.  `None` if the URL does not fit the template.
    pub fn video_id_from_url(&self, url: &str) -> Option<String> {
        let (prefix, suffix) = self.url_template.split_once("{id}")?;
        let id = url.strip_prefix(prefix)?.strip_suffix(suffix)?;
        // Extra query parameters appended by the player (e.g. "&t=30").
        let id = id.split(['&', '#']).next().unwrap_or(id);
        (!id.is_empty()).then(|| id.to_string())
    }
}

impl Config {
    /// Read `config.toml`.  A missing file yields the defaults; nothing is
    /// written back.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
