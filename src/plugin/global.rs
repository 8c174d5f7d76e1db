use once_cell::sync::Lazy;
use std::sync::Arc;

use super::registry::{Plugin, PluginError, PluginRegistry, Plugins};

/// 全局插件注册表，预置 metrics 插件
static GLOBAL_PLUGINS: Lazy<PluginRegistry> = Lazy::new(PluginRegistry::with_defaults);

pub fn plugins() -> &'static PluginRegistry {
    &GLOBAL_PLUGINS
}

/// 向全局注册表注册插件
pub fn register(plugin: Arc<dyn Plugin>) {
    GLOBAL_PLUGINS.register(plugin);
}

/// 使用全局注册表初始化配置中声明的插件
pub fn setup(config: &Plugins) -> Result<(), PluginError> {
    config.setup(&GLOBAL_PLUGINS)
}
