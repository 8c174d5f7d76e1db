use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use super::metrics;

/// 插件相关错误
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin for {0} not registered")]
    NotRegistered(String),

    #[error("plugin {name} setup failed: {source}")]
    Setup {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 插件
///
/// 由配置文件中同名的配置片段驱动初始化
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// 使用插件自己的配置片段完成初始化
    fn setup(&self, config: &YamlValue) -> anyhow::Result<()>;
}

/// 插件注册表，重复注册时后者覆盖前者
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建预置全局 metrics 插件的注册表
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(metrics::global());
        registry
    }

    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// 插件配置：插件名 -> 该插件的配置片段
///
/// ```yaml
/// plugins:
///   metrics:
///     endpoint: ":9090"
///     namespace: app
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plugins(pub BTreeMap<String, YamlValue>);

impl Plugins {
    /// 按插件名顺序依次初始化，遇到未注册的插件或初始化失败立即返回
    pub fn setup(&self, registry: &PluginRegistry) -> Result<(), PluginError> {
        for (name, config) in &self.0 {
            let plugin = registry
                .get(name)
                .ok_or_else(|| PluginError::NotRegistered(name.clone()))?;
            plugin.setup(config).map_err(|e| PluginError::Setup {
                name: name.clone(),
                source: e.into(),
            })?;
            log::debug!("plugin {} set up", name);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
