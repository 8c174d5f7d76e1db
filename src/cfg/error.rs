use thiserror::Error;

/// 配置源读取错误
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("{0}")]
    Other(String),
}

impl From<notify::Error> for ProviderError {
    fn from(err: notify::Error) -> Self {
        match err.kind {
            notify::ErrorKind::Io(e) => ProviderError::Io(e),
            notify::ErrorKind::PathNotFound => ProviderError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("path not found: {:?}", err.paths),
            )),
            kind => ProviderError::Watcher(format!("{:?}", kind)),
        }
    }
}

/// 解码错误
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Parse failed: {0}")]
    Parse(String),

    #[error("Deserialization failed: {0}")]
    Deserialize(String),
}

/// 配置加载错误
///
/// 所有错误都同步返回给 `load` 的调用方；后台变更通知路径上的失败只记录日志
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("codec not registered: {0}")]
    CodecNotRegistered(String),

    #[error("provider not registered: {0}")]
    ProviderNotRegistered(String),

    #[error("receiver missing")]
    ReceiverMissing,

    #[error("failed to load {path}: {source}")]
    SourceRead {
        path: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to parse {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: CodecError,
    },
}
