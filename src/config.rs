//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 钱包核心配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub fee: FeeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 地址发现（gap limit）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// 每批派生的地址数量
    pub batch_size: u32,
    /// 一批中至少需要多少个纯净地址才停止扫描
    pub min_address_count: u32,
    /// 两次派生之间的最小间隔（毫秒）
    pub derive_delay_ms: u64,
}

/// 增量同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub chunk_size: usize,
    pub concurrency: usize,
}

/// 手续费配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub cache_ttl_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: env_or("WALLET_DISCOVERY_BATCH_SIZE", 20),
            min_address_count: env_or("WALLET_MIN_PURE_ADDRESSES", 20),
            derive_delay_ms: env_or("WALLET_DERIVE_DELAY_MS", 0),
        }
    }
}

impl DiscoveryConfig {
    pub fn derive_delay(&self) -> Duration {
        Duration::from_millis(self.derive_delay_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: env_or("WALLET_SYNC_CHUNK_SIZE", 20),
            concurrency: env_or("WALLET_SYNC_CONCURRENCY", 4),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: env_or("WALLET_FEE_CACHE_TTL_SECS", 60),
        }
    }
}

impl FeeConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Config {
    /// 从环境变量加载配置（会先尝试读取 .env）
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            discovery: DiscoveryConfig::default(),
            sync: SyncConfig::default(),
            fee: FeeConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 环境变量打底，文件存在时文件覆盖
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery.batch_size == 0 {
            anyhow::bail!("WALLET_DISCOVERY_BATCH_SIZE must be greater than 0");
        }

        if self.discovery.min_address_count == 0 {
            anyhow::bail!("WALLET_MIN_PURE_ADDRESSES must be greater than 0");
        }

        // 批量小于阈值时一批永远凑不够纯净地址，发现流程不会终止
        if self.discovery.batch_size < self.discovery.min_address_count {
            anyhow::bail!(
                "WALLET_DISCOVERY_BATCH_SIZE ({}) must be >= WALLET_MIN_PURE_ADDRESSES ({})",
                self.discovery.batch_size,
                self.discovery.min_address_count
            );
        }

        if self.sync.chunk_size == 0 {
            anyhow::bail!("WALLET_SYNC_CHUNK_SIZE must be greater than 0");
        }

        if self.sync.concurrency == 0 {
            anyhow::bail!("WALLET_SYNC_CONCURRENCY must be greater than 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
