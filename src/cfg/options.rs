use std::fmt;
use std::sync::Arc;

use super::receiver::Receiver;

/// 加载选项
///
/// 按调用顺序生效，同一字段以最后一次设置为准
///
/// # 示例
/// ```
/// use mixcfg::cfg::LoadOptions;
/// use serde::Deserialize;
/// use std::sync::{Arc, RwLock};
///
/// #[derive(Default, Deserialize)]
/// struct App {
///     name: String,
/// }
///
/// let app = Arc::new(RwLock::new(App::default()));
/// let options = LoadOptions::new()
///     .with_codec("json")
///     .with_codec("yaml")
///     .with_receiver(app.clone())
///     .with_disable_watch(true);
/// assert_eq!(options.codec(), Some("yaml"));
/// ```
#[derive(Clone, Default)]
pub struct LoadOptions {
    codec: Option<String>,
    provider: Option<String>,
    receiver: Option<Arc<dyn Receiver>>,
    disable_watch: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定 codec 名称，默认 `yaml`
    pub fn with_codec(mut self, name: impl Into<String>) -> Self {
        self.codec = Some(name.into());
        self
    }

    /// 指定 provider 名称，默认 `file`
    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    /// 指定解码目标，必填
    pub fn with_receiver(mut self, receiver: Arc<dyn Receiver>) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// 关闭后台自动重新加载
    ///
    /// 关闭后文件变化仍会使缓存失效，下一次 `load` 重新读取
    pub fn with_disable_watch(mut self, disable: bool) -> Self {
        self.disable_watch = disable;
        self
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn receiver(&self) -> Option<&Arc<dyn Receiver>> {
        self.receiver.as_ref()
    }

    pub fn disable_watch(&self) -> bool {
        self.disable_watch
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("codec", &self.codec)
            .field("provider", &self.provider)
            .field("receiver", &self.receiver.is_some())
            .field("disable_watch", &self.disable_watch)
            .finish()
    }
}
