//! 带缓存的配置加载器
//!
//! 按 (provider, codec, path) 缓存加载结果，首次加载成功后向 provider 订阅变更：
//! 变更时先让缓存失效，未关闭监听时立即在后台重新加载并写回 receiver。
//! 同一 key 的加载、失效和重新加载都在该 key 的锁内串行执行

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::codec::{Codec, CodecRegistry, DEFAULT_CODEC};
use super::error::ConfigError;
use super::options::LoadOptions;
use super::provider::{Provider, ProviderRegistry, DEFAULT_PROVIDER};
use super::receiver::Receiver;

/// 缓存 key
///
/// 同一路径使用不同 provider 或 codec 加载时互相独立
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: String,
    pub codec: String,
    pub path: String,
}

impl CacheKey {
    pub fn new(provider: impl Into<String>, codec: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            codec: codec.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.provider, self.codec, self.path)
    }
}

struct LoaderEntry {
    provider: Arc<dyn Provider>,
    codec: Arc<dyn Codec>,
    path: String,
    disable_watch: bool,
    raw_data: Bytes,
}

/// 已加载配置的只读视图
///
/// 在被淘汰前一直有效，重新加载会产生新的实例
#[derive(Clone)]
pub struct Config {
    entry: Arc<LoaderEntry>,
}

impl Config {
    /// 原始配置内容
    pub fn raw_data(&self) -> &[u8] {
        &self.entry.raw_data
    }

    pub fn bytes(&self) -> Bytes {
        self.entry.raw_data.clone()
    }

    pub fn path(&self) -> &str {
        &self.entry.path
    }

    pub fn provider_name(&self) -> &str {
        self.entry.provider.name()
    }

    pub fn codec_name(&self) -> &str {
        self.entry.codec.name()
    }

    /// 是否为同一个缓存实例
    pub fn ptr_eq(a: &Config, b: &Config) -> bool {
        Arc::ptr_eq(&a.entry, &b.entry)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider_name())
            .field("codec", &self.codec_name())
            .field("path", &self.entry.path)
            .field("disable_watch", &self.entry.disable_watch)
            .field("len", &self.entry.raw_data.len())
            .finish()
    }
}

/// 从选项解析出的加载参数
#[derive(Clone)]
struct LoadRequest {
    provider: Arc<dyn Provider>,
    codec: Arc<dyn Codec>,
    receiver: Arc<dyn Receiver>,
    disable_watch: bool,
}

/// 带缓存的配置加载器
///
/// 克隆后共享同一份缓存
///
/// # 示例
/// ```no_run
/// use mixcfg::cfg::{ConfigLoader, LoadOptions};
/// use serde::Deserialize;
/// use std::sync::{Arc, RwLock};
///
/// #[derive(Debug, Default, Deserialize)]
/// struct App {
///     name: String,
/// }
///
/// let loader = ConfigLoader::with_defaults();
/// let app = Arc::new(RwLock::new(App::default()));
///
/// // 文件变化后 app 会被自动更新
/// loader
///     .load("conf/app.yaml", LoadOptions::new().with_receiver(app.clone()))
///     .unwrap();
/// println!("{:?}", app.read().unwrap());
/// ```
#[derive(Clone)]
pub struct ConfigLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    codecs: Arc<CodecRegistry>,
    providers: Arc<ProviderRegistry>,
    cache: RwLock<HashMap<CacheKey, Config>>,
    /// 每个 key 一把锁，合并同一 key 上并发的未命中加载
    inflight: DashMap<CacheKey, Arc<Mutex<()>>>,
    /// 已向 provider 注册过变更回调的 key，以及变更时重新加载使用的参数
    watched: Mutex<HashMap<CacheKey, WatchTarget>>,
}

/// 最近一次未命中缓存的加载所使用的参数
struct WatchTarget {
    path: String,
    request: LoadRequest,
}

impl ConfigLoader {
    pub fn new(codecs: Arc<CodecRegistry>, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                codecs,
                providers,
                cache: RwLock::new(HashMap::new()),
                inflight: DashMap::new(),
                watched: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 使用独立的默认注册表创建加载器
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(CodecRegistry::with_defaults()),
            Arc::new(ProviderRegistry::with_defaults()),
        )
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.inner.codecs
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.inner.providers
    }

    /// 加载配置并写入 receiver
    ///
    /// 缓存命中时直接返回，不会再次读取或解码
    pub fn load(&self, path: &str, options: LoadOptions) -> Result<Config, ConfigError> {
        let request = self.inner.resolve(&options)?;
        let key = CacheKey::new(request.provider.name(), request.codec.name(), path);

        if let Some(config) = self.inner.cached(&key) {
            return Ok(config);
        }

        let config = self.inner.load_entry(&key, path, request.clone())?;
        LoaderInner::ensure_watch(&self.inner, key, path, request);
        Ok(config)
    }

    /// 查询缓存，不触发加载
    pub fn cached(&self, key: &CacheKey) -> Option<Config> {
        self.inner.cached(key)
    }

    /// 缓存中的条目数
    pub fn len(&self) -> usize {
        self.inner
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LoaderInner {
    /// 在任何 I/O 之前校验 codec、provider、receiver
    fn resolve(&self, options: &LoadOptions) -> Result<LoadRequest, ConfigError> {
        let codec_name = options.codec().unwrap_or(DEFAULT_CODEC);
        let codec = self
            .codecs
            .get(codec_name)
            .ok_or_else(|| ConfigError::CodecNotRegistered(codec_name.to_string()))?;

        let provider_name = options.provider().unwrap_or(DEFAULT_PROVIDER);
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| ConfigError::ProviderNotRegistered(provider_name.to_string()))?;

        let receiver = options
            .receiver()
            .cloned()
            .ok_or(ConfigError::ReceiverMissing)?;

        Ok(LoadRequest {
            provider,
            codec,
            receiver,
            disable_watch: options.disable_watch(),
        })
    }

    fn cached(&self, key: &CacheKey) -> Option<Config> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.inflight.entry(key.clone()).or_default().clone()
    }

    fn load_entry(&self, key: &CacheKey, path: &str, request: LoadRequest) -> Result<Config, ConfigError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // 等待期间可能已被其他调用方加载
        if let Some(config) = self.cached(key) {
            return Ok(config);
        }

        self.fetch(key, path, request)
    }

    /// 读取、解码并写入缓存，调用方需持有 key 的锁
    fn fetch(&self, key: &CacheKey, path: &str, request: LoadRequest) -> Result<Config, ConfigError> {
        let raw_data = request
            .provider
            .read(path)
            .map_err(|source| ConfigError::SourceRead {
                path: path.to_string(),
                source,
            })?;
        request
            .codec
            .decode(&raw_data, request.receiver.as_ref())
            .map_err(|source| ConfigError::Decode {
                path: path.to_string(),
                source,
            })?;

        let config = Config {
            entry: Arc::new(LoaderEntry {
                provider: request.provider,
                codec: request.codec,
                path: path.to_string(),
                disable_watch: request.disable_watch,
                raw_data,
            }),
        };
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), config.clone());
        log::debug!("config {} loaded", key);

        Ok(config)
    }

    /// 每个 key 只注册一次变更回调，重新加载参数更新为最近一次加载所用的参数
    fn ensure_watch(inner: &Arc<Self>, key: CacheKey, path: &str, request: LoadRequest) {
        let provider = request.provider.clone();
        let newly_watched = inner
            .watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.clone(),
                WatchTarget {
                    path: path.to_string(),
                    request,
                },
            )
            .is_none();
        if !newly_watched {
            return;
        }

        let loader = Arc::downgrade(inner);
        let path = path.to_string();
        provider.watch(Arc::new(move |changed: &str, _data: &Bytes| {
            if changed != path {
                return;
            }
            if let Some(inner) = loader.upgrade() {
                inner.on_change(&key);
            }
        }));
    }

    /// 无论当前是否在缓存中，每次变更都会淘汰并（未关闭监听时）重新加载
    fn on_change(&self, key: &CacheKey) {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
        {
            log::debug!("config {} changed, cache evicted", key);
        }

        let target = self
            .watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|target| (target.path.clone(), target.request.clone()));
        let (path, request) = match target {
            Some(target) => target,
            None => return,
        };
        if request.disable_watch {
            return;
        }

        if let Err(e) = self.fetch(key, &path, request) {
            log::warn!("reload config {} failed: {}", key, e);
        }
    }
}
