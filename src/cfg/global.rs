//! 全局配置加载器单例
//!
//! 进程内共享的 codec、provider 注册表和加载器，首次使用时创建，随进程存在

use once_cell::sync::Lazy;
use std::sync::Arc;

use super::codec::{Codec, CodecRegistry};
use super::error::ConfigError;
use super::loader::{Config, ConfigLoader};
use super::options::LoadOptions;
use super::provider::{Provider, ProviderRegistry};

static CODECS: Lazy<Arc<CodecRegistry>> = Lazy::new(|| Arc::new(CodecRegistry::with_defaults()));

static PROVIDERS: Lazy<Arc<ProviderRegistry>> =
    Lazy::new(|| Arc::new(ProviderRegistry::with_defaults()));

static DEFAULT_LOADER: Lazy<ConfigLoader> =
    Lazy::new(|| ConfigLoader::new(CODECS.clone(), PROVIDERS.clone()));

/// 全局 codec 注册表
pub fn codecs() -> Arc<CodecRegistry> {
    CODECS.clone()
}

/// 全局 provider 注册表
pub fn providers() -> Arc<ProviderRegistry> {
    PROVIDERS.clone()
}

/// 全局加载器
pub fn default_loader() -> &'static ConfigLoader {
    &DEFAULT_LOADER
}

pub fn register_codec(codec: Arc<dyn Codec>) {
    CODECS.register(codec);
}

pub fn register_provider(provider: Arc<dyn Provider>) {
    PROVIDERS.register(provider);
}

/// 使用全局加载器加载配置
///
/// # 示例
/// ```no_run
/// use mixcfg::cfg::{self, LoadOptions};
/// use serde::Deserialize;
/// use std::sync::{Arc, RwLock};
///
/// #[derive(Debug, Default, Deserialize)]
/// struct App {
///     name: String,
/// }
///
/// let app = Arc::new(RwLock::new(App::default()));
/// cfg::load("conf/app.yaml", LoadOptions::new().with_receiver(app.clone())).unwrap();
/// ```
pub fn load(path: &str, options: LoadOptions) -> Result<Config, ConfigError> {
    DEFAULT_LOADER.load(path, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_registries_are_shared() {
        assert!(Arc::ptr_eq(&codecs(), &codecs()));
        assert!(Arc::ptr_eq(&providers(), default_loader().providers()));
        assert!(Arc::ptr_eq(&codecs(), default_loader().codecs()));
        assert!(codecs().get("yaml").is_some());
        assert!(providers().get("file").is_some());
    }
}
