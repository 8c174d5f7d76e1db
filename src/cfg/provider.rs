//! 配置源抽象
//!
//! provider 负责读取原始字节，并在数据变化时通知订阅者

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::error::ProviderError;
use super::file_provider::{FileProvider, FileProviderConfig};

/// 默认 provider 名称
pub const DEFAULT_PROVIDER: &str = "file";

/// 变更回调，参数为调用方最初请求的路径和变更后的完整内容
///
/// 回调可能在任意线程上被并发调用
pub type ProviderCallback = Arc<dyn Fn(&str, &Bytes) + Send + Sync>;

/// 配置源
pub trait Provider: Send + Sync {
    /// provider 名称，作为注册表的 key
    fn name(&self) -> &str;

    /// 读取指定路径的完整内容
    fn read(&self, path: &str) -> Result<Bytes, ProviderError>;

    /// 注册变更回调
    ///
    /// 回调会收到所有被读取过的路径的变更，由回调自行过滤。
    /// 不支持变更检测的 provider 可以直接忽略回调。
    fn watch(&self, callback: ProviderCallback);
}

/// provider 注册表
///
/// 按 provider 自身声明的名称注册，重复注册时后者覆盖前者
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建预置文件 provider 的注册表
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(FileProvider::new(FileProviderConfig::default())));
        registry
    }

    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        name: &'static str,
        data: &'static str,
    }

    impl Provider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn read(&self, _path: &str) -> Result<Bytes, ProviderError> {
            Ok(Bytes::from_static(self.data.as_bytes()))
        }

        fn watch(&self, _callback: ProviderCallback) {}
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ProviderRegistry::with_defaults();
        let provider = registry.get(DEFAULT_PROVIDER).unwrap();
        assert_eq!(provider.name(), "file");
        assert!(registry.get("etcd").is_none());
    }

    #[test]
    fn test_registry_last_write_wins() -> anyhow::Result<()> {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StaticProvider {
            name: "static",
            data: "first",
        }));
        registry.register(Arc::new(StaticProvider {
            name: "static",
            data: "second",
        }));

        let provider = registry.get("static").unwrap();
        assert_eq!(provider.read("any")?, Bytes::from_static(b"second"));
        Ok(())
    }
}
