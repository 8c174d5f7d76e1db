//! 解码目标
//!
//! codec 把原始字节解析成格式无关的 [`ConfigValue`]，再交给调用方持有的
//! [`Receiver`] 写入具体类型

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::error::CodecError;

/// 配置值包装，提供类型转换能力
///
/// # 示例
/// ```
/// use mixcfg::cfg::ConfigValue;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Server {
///     port: u16,
/// }
///
/// let value = ConfigValue::new(serde_json::json!({ "port": 8080 }));
/// let server: Server = value.into_type().unwrap();
/// assert_eq!(server.port, 8080);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValue(pub JsonValue);

impl ConfigValue {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// 转换为指定类型（消费 self）
    pub fn into_type<T: DeserializeOwned>(self) -> Result<T, CodecError> {
        serde_json::from_value(self.0).map_err(|e| CodecError::Deserialize(e.to_string()))
    }

    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_value(self) -> JsonValue {
        self.0
    }
}

/// 解码目标
///
/// 由调用方持有，通过 `Arc` 与 loader 共享。每次解码都会整体替换内部的值，
/// 后台重新加载时同样写入同一个 receiver。
///
/// 已为 `RwLock<T>`、`Mutex<T>` 和 `ArcSwap<T>` 实现：
///
/// ```
/// use mixcfg::cfg::{ConfigValue, Receiver};
/// use serde::Deserialize;
/// use std::sync::{Arc, RwLock};
///
/// #[derive(Debug, Default, Deserialize)]
/// struct App {
///     name: String,
/// }
///
/// let app = Arc::new(RwLock::new(App::default()));
/// app.receive(ConfigValue::new(serde_json::json!({ "name": "x" }))).unwrap();
/// assert_eq!(app.read().unwrap().name, "x");
/// ```
pub trait Receiver: Send + Sync {
    fn receive(&self, value: ConfigValue) -> Result<(), CodecError>;
}

impl<T> Receiver for RwLock<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn receive(&self, value: ConfigValue) -> Result<(), CodecError> {
        // 先完成解码，失败时保留旧值
        let decoded: T = value.into_type()?;
        *self.write().unwrap_or_else(PoisonError::into_inner) = decoded;
        Ok(())
    }
}

impl<T> Receiver for Mutex<T>
where
    T: DeserializeOwned + Send,
{
    fn receive(&self, value: ConfigValue) -> Result<(), CodecError> {
        let decoded: T = value.into_type()?;
        *self.lock().unwrap_or_else(PoisonError::into_inner) = decoded;
        Ok(())
    }
}

impl<T> Receiver for ArcSwap<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn receive(&self, value: ConfigValue) -> Result<(), CodecError> {
        let decoded: T = value.into_type()?;
        self.store(Arc::new(decoded));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, Deserialize, PartialEq)]
    struct Database {
        host: String,
        port: u16,
    }

    #[test]
    fn test_rwlock_receiver_replaces_value() {
        let receiver = RwLock::new(Database::default());
        receiver
            .receive(ConfigValue::new(json!({ "host": "localhost", "port": 3306 })))
            .unwrap();

        let db = receiver.read().unwrap().clone();
        assert_eq!(db.host, "localhost");
        assert_eq!(db.port, 3306);
    }

    #[test]
    fn test_receiver_keeps_old_value_on_failure() {
        let receiver = Mutex::new(Database {
            host: "old".to_string(),
            port: 1,
        });

        let result = receiver.receive(ConfigValue::new(json!({ "host": "new", "port": "nan" })));
        assert!(matches!(result, Err(CodecError::Deserialize(_))));
        assert_eq!(receiver.lock().unwrap().host, "old");
    }

    #[test]
    fn test_arc_swap_receiver() {
        let receiver = ArcSwap::from_pointee(Database::default());
        receiver
            .receive(ConfigValue::new(json!({ "host": "db", "port": 5432 })))
            .unwrap();

        let db = receiver.load_full();
        assert_eq!(db.port, 5432);
    }
}
