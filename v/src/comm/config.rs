use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};

lazy_static! {
    static ref GLOBAL_CONFIG_MANAGER: RwLock<Option<Arc<ConfigManager>>> = RwLock::new(None);
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },
    #[error("配置项 '{key}' 不存在")]
    KeyNotFound { key: String },
    #[error("配置初始化失败: {message}")]
    InitializationError { message: String },
}

/// 配置管理器
///
/// 配置优先级：环境变量（V__ 前缀）> 配置文件
/// Priority: environment variables (V__ prefix) > config file
pub struct ConfigManager {
    config: Config,
}

impl ConfigManager {
    /// 从配置文件创建配置管理器（TOML/JSON/YAML 按扩展名识别）
    /// Create a config manager from a file (format detected by extension)
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("V").separator("__"));
        let config = builder.build().map_err(|e| ConfigError::InitializationError {
            message: e.to_string(),
        })?;
        Ok(Self { config })
    }

    /// 无配置文件时仅从环境变量构建
    /// Build from environment variables only
    pub fn from_env() -> Result<Self> {
        let builder =
            Config::builder().add_source(Environment::with_prefix("V").separator("__"));
        let config = builder.build().map_err(|e| ConfigError::InitializationError {
            message: e.to_string(),
        })?;
        Ok(Self { config })
    }

    /// 获取配置项，不存在时返回错误
    /// Get a config value, error when missing
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.config
            .get::<T>(key)
            .map_err(|_| ConfigError::KeyNotFound { key: key.to_string() }.into())
    }

    /// 获取配置项，不存在时返回默认值
    /// Get a config value, fallback to a default when missing
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.config.get::<T>(key).unwrap_or(default)
    }
}

/// 使用指定配置文件初始化全局配置管理器
/// Initialize the global config manager with the given file
pub fn init_global_config_with_file(path: &str) -> Result<()> {
    let manager = Arc::new(ConfigManager::from_file(path)?);
    let mut guard = GLOBAL_CONFIG_MANAGER
        .write()
        .map_err(|_| anyhow!("global config lock poisoned"))?;
    *guard = Some(manager);
    Ok(())
}

/// 获取全局配置管理器（未初始化时回退为纯环境变量配置）
/// Get the global config manager (falls back to env-only when uninitialized)
pub fn get_global_config_manager() -> Result<Arc<ConfigManager>> {
    {
        let guard = GLOBAL_CONFIG_MANAGER
            .read()
            .map_err(|_| anyhow!("global config lock poisoned"))?;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }
    }
    let manager = Arc::new(ConfigManager::from_env()?);
    let mut guard = GLOBAL_CONFIG_MANAGER
        .write()
        .map_err(|_| anyhow!("global config lock poisoned"))?;
    if guard.is_none() {
        *guard = Some(manager.clone());
    }
    Ok(guard.as_ref().cloned().unwrap_or(manager))
}
