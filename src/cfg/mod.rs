//! cfg 模块 - 配置加载
//!
//! 通过可插拔的 provider 读取原始配置，经 codec 解码写入调用方的 receiver，
//! 按 (provider, codec, path) 缓存，并在配置源变化时自动失效和重新加载

// 模块声明
pub mod codec;
pub mod error;
pub mod file_provider;
pub mod global;
pub mod loader;
pub mod macros;
pub mod options;
pub mod provider;
pub mod receiver;

// 重新导出公共 API
pub use codec::{Codec, CodecRegistry, JsonCodec, TomlCodec, YamlCodec, DEFAULT_CODEC};
pub use error::{CodecError, ConfigError, ProviderError};
pub use file_provider::{FileProvider, FileProviderConfig};
pub use global::{codecs, default_loader, load, providers, register_codec, register_provider};
pub use loader::{CacheKey, Config, ConfigLoader};
pub use options::LoadOptions;
pub use provider::{Provider, ProviderCallback, ProviderRegistry, DEFAULT_PROVIDER};
pub use receiver::{ConfigValue, Receiver};
