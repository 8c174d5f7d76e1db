//! mixcfg - 带缓存和热加载的配置加载库
//!
//! ## 模块
//!
//! - **cfg**: 配置加载，provider 读取原始数据，codec 解码到调用方的 receiver，
//!   结果按 (provider, codec, path) 缓存，配置源变化时自动失效并重新加载
//! - **plugin**: 插件注册与初始化，内置 Prometheus metrics 插件
//!
//! ## 示例
//!
//! ```no_run
//! use mixcfg::{LoadOptions, Receiver};
//! use serde::Deserialize;
//! use std::sync::{Arc, RwLock};
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct AppConfig {
//!     name: String,
//! }
//!
//! let target = Arc::new(RwLock::new(AppConfig::default()));
//! let receiver: Arc<dyn Receiver> = target.clone();
//! mixcfg::load("app.yaml", LoadOptions::new().with_receiver(receiver))?;
//! println!("{}", target.read().unwrap().name);
//! # Ok::<(), mixcfg::ConfigError>(())
//! ```

pub mod cfg;
pub mod plugin;

// 重新导出主要的公共 API
pub use cfg::{
    load, CacheKey, Codec, CodecError, CodecRegistry, Config, ConfigError, ConfigLoader,
    ConfigValue, FileProvider, FileProviderConfig, LoadOptions, Provider, ProviderCallback,
    ProviderError, ProviderRegistry, Receiver,
};

pub use plugin::{MetricsConfig, MetricsPlugin, Plugin, PluginError, PluginRegistry, Plugins};
