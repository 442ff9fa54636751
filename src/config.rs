use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {} 失败：{source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("解析配置失败：{0}")]
    Parse(#[from] toml::de::Error),

    #[error("无效的时长：{0:?}")]
    Duration(String),

    #[error("配置项 {field} 无效：{message}")]
    Invalid { field: &'static str, message: String },
}

/// 构建管道配置（值对象，不读取环境变量）
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub base_url: String,
    /// 为空时使用语言目录中的默认语言
    #[serde(default)]
    pub default_locale: String,
    /// 为空时使用语言目录中所有启用的语言
    #[serde(default)]
    pub locales: Vec<String>,
    /// 菜单别名 → 菜单代码
    #[serde(default)]
    pub menus: BTreeMap<String, String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_render_timeout", deserialize_with = "de_duration")]
    pub render_timeout: Duration,
    #[serde(default = "default_asset_copy_timeout", deserialize_with = "de_duration")]
    pub asset_copy_timeout: Duration,
    /// 单次存储读写（含建目录、删除）的时限
    #[serde(default = "default_storage_timeout", deserialize_with = "de_duration")]
    pub storage_timeout: Duration,
    #[serde(default = "default_true")]
    pub incremental: bool,
    #[serde(default = "default_true")]
    pub copy_assets: bool,
    #[serde(default = "default_true")]
    pub generate_sitemap: bool,
    #[serde(default = "default_true")]
    pub generate_robots: bool,
    #[serde(default = "default_true")]
    pub generate_feeds: bool,
    #[serde(default)]
    pub clean_build: bool,
    /// 相对 output_dir 的构建清单文件名
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// 默认语言是否也使用 /{locale}/ 前缀
    #[serde(default)]
    pub prefix_default_locale: bool,
    #[serde(default)]
    pub robots_disallow: Vec<String>,
    #[serde(default)]
    pub site: SiteInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl GeneratorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GeneratorConfig = toml::from_str(content)?;
        config.validate()
    }

    /// 规范化配置：workers 至少为 1、去掉 base_url 末尾斜杠、超时必须非零
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            tracing::warn!("workers 配置为 0，按 1 处理");
            self.workers = 1;
        }
        self.base_url = self.base_url.trim_end_matches('/').to_owned();
        if self.render_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "render_timeout",
                message: "必须大于 0".into(),
            });
        }
        if self.asset_copy_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "asset_copy_timeout",
                message: "必须大于 0".into(),
            });
        }
        if self.storage_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "storage_timeout",
                message: "必须大于 0".into(),
            });
        }
        if self.manifest_file.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "manifest_file",
                message: "不能为空".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        self.locales.retain(|code| seen.insert(code.clone()));
        Ok(self)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.manifest_file)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            base_url: String::new(),
            default_locale: String::new(),
            locales: Vec::new(),
            menus: BTreeMap::new(),
            workers: default_workers(),
            render_timeout: default_render_timeout(),
            asset_copy_timeout: default_asset_copy_timeout(),
            storage_timeout: default_storage_timeout(),
            incremental: true,
            copy_assets: true,
            generate_sitemap: true,
            generate_robots: true,
            generate_feeds: true,
            clean_build: false,
            manifest_file: default_manifest_file(),
            prefix_default_locale: false,
            robots_disallow: Vec::new(),
            site: SiteInfo::default(),
        }
    }
}

/// 解析 "500ms"、"30s"、"2m"、"1h"、"1d" 形式的时长，纯数字按秒处理
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| ConfigError::Duration(s.to_owned()))?;
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(num),
        "" | "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        "d" => Duration::from_secs(num * 86400),
        _ => return Err(ConfigError::Duration(s.to_owned())),
    };
    Ok(duration)
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

// 默认值函数
fn default_output_dir() -> PathBuf { PathBuf::from("public") }
fn default_workers() -> usize { 1 }
fn default_render_timeout() -> Duration { Duration::from_secs(30) }
fn default_asset_copy_timeout() -> Duration { Duration::from_secs(120) }
fn default_storage_timeout() -> Duration { Duration::from_secs(30) }
fn default_true() -> bool { true }
fn default_manifest_file() -> String { ".build-manifest.json".into() }
