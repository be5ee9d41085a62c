use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 截图流程配置
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// 等待媒体进入可播放状态的最长时间
    pub open_timeout: Duration,
    /// 轮询播放器状态的间隔
    pub poll_interval: Duration,
    /// 每个位置最多尝试截图的次数（含第一次）
    pub capture_attempts: u32,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(100),
            capture_attempts: 4,
            log_level: "info".to_string(),
        }
    }
}

impl FramerConfig {
    /// tracing 使用的日志级别，无法识别时退回 INFO
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

/// 从配置文件中读到的原始值，缺失的项为 None
#[derive(Debug, Default)]
struct PartialConfig {
    open_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    capture_attempts: Option<u32>,
    log_level: Option<String>,
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：环境变量 > 配置文件 > 默认值
    ///
    /// 指定了 `config_file` 但读取失败时返回错误；
    /// 未指定时从默认位置查找，找不到则使用默认值。
    pub fn load_config(config_file: Option<&Path>) -> Result<FramerConfig> {
        let file_config = match config_file {
            Some(config_path) => Self::load_from_file(config_path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };
        let env_config = Self::load_from_env();
        let defaults = FramerConfig::default();

        let capture_attempts = env_config
            .capture_attempts
            .or(file_config.capture_attempts)
            .unwrap_or(defaults.capture_attempts)
            .max(1);

        Ok(FramerConfig {
            open_timeout: env_config
                .open_timeout_ms
                .or(file_config.open_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.open_timeout),
            poll_interval: env_config
                .poll_interval_ms
                .or(file_config.poll_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            capture_attempts,
            log_level: env_config
                .log_level
                .or(file_config.log_level)
                .unwrap_or(defaults.log_level),
        })
    }

    fn load_from_env() -> PartialConfig {
        PartialConfig {
            open_timeout_ms: env::var("FRAMER_OPEN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            poll_interval_ms: env::var("FRAMER_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            capture_attempts: env::var("FRAMER_CAPTURE_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok()),
            log_level: env::var("FRAMER_LOG_LEVEL").ok().filter(|v| !v.is_empty()),
        }
    }

    /// 从INI配置文件加载配置
    fn load_from_file(config_path: &Path) -> Result<PartialConfig> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser.load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        // 先读 [snapshot] 节，没有则使用 [DEFAULT] 节
        let get = |key: &str| {
            config_parser.get("snapshot", key)
                .or_else(|| config_parser.get("DEFAULT", key))
        };

        Ok(PartialConfig {
            open_timeout_ms: get("open_timeout_ms").and_then(|v| v.parse().ok()),
            poll_interval_ms: get("poll_interval_ms").and_then(|v| v.parse().ok()),
            capture_attempts: get("capture_attempts").and_then(|v| v.parse().ok()),
            log_level: config_parser.get("logging", "level")
                .or_else(|| config_parser.get("DEFAULT", "log_level"))
                .filter(|v| !v.is_empty()),
        })
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Result<PartialConfig> {
        let mut candidates = vec![PathBuf::from("framer.ini"), PathBuf::from(".framer.ini")];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".framer.ini"));
        }
        candidates.push(PathBuf::from("/etc/framer.ini"));

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_file(&candidate);
            }
        }

        Err(anyhow::anyhow!("未找到配置文件"))
    }
}
