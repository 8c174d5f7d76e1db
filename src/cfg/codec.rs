//! 配置格式解码器
//!
//! 提供 codec 抽象与按名称查找的注册表，内置 yaml（默认）、json、toml 三种格式

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::error::CodecError;
use super::receiver::{ConfigValue, Receiver};

/// 默认 codec 名称
pub const DEFAULT_CODEC: &str = "yaml";

/// 配置格式解码器
///
/// 无状态，可被多个加载项并发共享
pub trait Codec: Send + Sync {
    /// codec 名称，作为注册表的 key
    fn name(&self) -> &str;

    /// 将原始字节解码写入 target
    fn decode(&self, data: &[u8], target: &dyn Receiver) -> Result<(), CodecError>;
}

/// YAML 解码器
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn name(&self) -> &str {
        "yaml"
    }

    fn decode(&self, data: &[u8], target: &dyn Receiver) -> Result<(), CodecError> {
        let value: JsonValue =
            serde_yaml::from_slice(data).map_err(|e| CodecError::Parse(e.to_string()))?;
        // 空文件或只有注释的文件视为空映射
        let value = match value {
            JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
            value => value,
        };
        target.receive(ConfigValue::new(value))
    }
}

/// JSON 解码器
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn decode(&self, data: &[u8], target: &dyn Receiver) -> Result<(), CodecError> {
        let value: JsonValue =
            serde_json::from_slice(data).map_err(|e| CodecError::Parse(e.to_string()))?;
        target.receive(ConfigValue::new(value))
    }
}

/// TOML 解码器
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlCodec;

impl Codec for TomlCodec {
    fn name(&self) -> &str {
        "toml"
    }

    fn decode(&self, data: &[u8], target: &dyn Receiver) -> Result<(), CodecError> {
        let content = std::str::from_utf8(data).map_err(|e| CodecError::Parse(e.to_string()))?;
        let value: JsonValue = toml::from_str(content).map_err(|e| CodecError::Parse(e.to_string()))?;
        target.receive(ConfigValue::new(value))
    }
}

/// codec 注册表
///
/// 按 codec 自身声明的名称注册，重复注册时后者覆盖前者
#[derive(Default)]
pub struct CodecRegistry {
    codecs: RwLock<HashMap<String, Arc<dyn Codec>>>,
}

impl CodecRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建预置 yaml、json、toml 的注册表
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(YamlCodec));
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(TomlCodec));
        registry
    }

    pub fn register(&self, codec: Arc<dyn Codec>) {
        let name = codec.name().to_string();
        self.codecs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, codec);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.codecs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// 已注册的 codec 名称（有序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .codecs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
