//! 应用配置管理
//!
//! 进程启动时加载一次：先读 `config.json`，再用环境变量覆盖，
//! 之后以 `Arc<AppConfig>` 的形式注入各个服务，运行期不再读取环境变量。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// 获取配置文件路径
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("FLAIRY_CONFIG") {
        return PathBuf::from(path);
    }
    // 配置文件位于可执行文件同级目录
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

/// 候选行不足时的补齐策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PadPolicy {
    /// 重复最后一条被接受的行，直到数量达标
    #[default]
    RepeatLast,
    /// 原样返回较短的结果
    ReturnShort,
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 每个窗口内允许的最大请求数
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: usize,
    /// 窗口长度（秒）
    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_rate_limit_max(),
            window_secs: default_rate_limit_window(),
        }
    }
}

/// 后端请求日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogSettings {
    #[serde(default)]
    pub enabled: bool,
    /// 日志目录，缺省为可执行文件旁的 storage/
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// 最多保留的条目数
    #[serde(default = "default_log_max_entries")]
    pub max_entries: usize,
}

impl Default for RequestLogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            max_entries: default_log_max_entries(),
        }
    }
}

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 生成后端 API 密钥，为空时走 dummy 逻辑
    #[serde(default)]
    pub api_key: String,

    /// 生成后端基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// 文本生成模型
    #[serde(default = "default_model")]
    pub model: String,

    /// 视觉 OCR 首选模型
    #[serde(default = "default_model")]
    pub vision_model: String,

    /// 主创作调用的温度
    #[serde(default = "default_creative_temperature")]
    pub creative_temperature: f64,

    /// 格式修复调用的温度
    #[serde(default = "default_repair_temperature")]
    pub repair_temperature: f64,

    /// 最大 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// 单次后端调用超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// OCR 引擎 API 密钥，为空时禁用该引擎
    #[serde(default = "default_ocr_api_key")]
    pub ocr_api_key: String,

    /// OCR 引擎端点
    #[serde(default = "default_ocr_endpoint")]
    pub ocr_endpoint: String,

    /// 默认语言
    #[serde(default = "default_language")]
    pub default_language: String,

    /// 多样性过滤后的补齐策略
    #[serde(default)]
    pub pad_policy: PadPolicy,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub request_log: RequestLogSettings,

    /// 监听地址
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_true() -> bool {
    true
}

fn default_log_max_entries() -> usize {
    1000
}

fn default_rate_limit_max() -> usize {
    30
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_creative_temperature() -> f64 {
    0.7
}

fn default_repair_temperature() -> f64 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_ocr_api_key() -> String {
    // OCR.space 公共测试密钥
    "helloworld".to_string()
}

fn default_ocr_endpoint() -> String {
    "https://api.ocr.space/parse/image".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8765".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            vision_model: default_model(),
            creative_temperature: default_creative_temperature(),
            repair_temperature: default_repair_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_timeout_secs(),
            ocr_api_key: default_ocr_api_key(),
            ocr_endpoint: default_ocr_endpoint(),
            default_language: default_language(),
            pad_policy: PadPolicy::default(),
            rate_limit: RateLimitSettings::default(),
            request_log: RequestLogSettings::default(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl AppConfig {
    /// 加载配置：文件 → 环境变量覆盖 → 校验
    pub fn load() -> Result<Self, AppError> {
        let mut config = load_config_from_file(&get_config_path())?.unwrap_or_default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// 使用给定的查找函数覆盖配置项
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = v;
        }
        if let Some(v) = get("OPENAI_MODEL").filter(|v| !v.is_empty()) {
            self.model = v;
        }
        if let Some(v) = get("OPENAI_VISION_MODEL").filter(|v| !v.is_empty()) {
            self.vision_model = v;
        }
        if let Some(v) = get("OCRSPACE_API_KEY") {
            self.ocr_api_key = v;
        }
        if let Some(v) = get("FLAIRY_BIND_ADDR").filter(|v| !v.is_empty()) {
            self.bind_addr = v;
        }
        if let Some(v) = get("FLAIRY_DEFAULT_LANGUAGE").filter(|v| !v.is_empty()) {
            self.default_language = v.to_lowercase();
        }
    }

    /// 校验配置取值范围
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("creative_temperature", self.creative_temperature),
            ("repair_temperature", self.repair_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "{} must be within 0.0..=2.0, got {}",
                    name, value
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config("request_timeout_secs must be > 0".to_string()));
        }
        if self.rate_limit.enabled && self.rate_limit.window_secs == 0 {
            return Err(AppError::Config("rate_limit.window_secs must be > 0".to_string()));
        }
        Ok(())
    }

    /// 是否配置了生成后端凭据
    pub fn has_backend(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// 是否启用 OCR 引擎
    pub fn has_ocr_engine(&self) -> bool {
        !self.ocr_api_key.is_empty()
    }

    /// 视觉 OCR 的备用模型
    pub fn vision_fallback_model(&self) -> String {
        if self.vision_model == "gpt-4o-mini" {
            "gpt-4o".to_string()
        } else {
            "gpt-4o-mini".to_string()
        }
    }
}

/// 从文件加载配置；文件不存在时返回 None
fn load_config_from_file(path: &Path) -> Result<Option<AppConfig>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    let config = serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(config))
}
