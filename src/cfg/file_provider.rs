//! 文件配置源
//!
//! 从本地文件系统读取配置，并在文件被写入时通知订阅者
//!
//! # 架构说明
//!
//! - **目录级监听**：`read` 时把文件所在目录注册到 notify watcher，同一目录只注册一次，
//!   读取成功后才记录请求路径
//! - **单一事件循环线程**：回调注册和 notify 原始事件通过通道串行进入同一个线程，
//!   水位（最后一次通知的修改时间）和待处理事件只在该线程内读写
//! - **防抖**：同一文件在 `debounce_delay` 内的多次写入只通知一次，读取的是最终内容；
//!   没有待处理事件时事件循环阻塞等待，不做周期唤醒
//! - **独立分发**：每个回调在独立线程中执行，慢回调不会阻塞事件循环和其他回调

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use smart_default::SmartDefault;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use super::error::ProviderError;
use super::provider::{Provider, ProviderCallback};
use crate::impl_from;

const MIN_TICK: Duration = Duration::from_millis(10);

/// 文件配置源的配置
#[derive(Debug, Clone, Deserialize, SmartDefault, PartialEq)]
#[serde(default)]
pub struct FileProviderConfig {
    /// 事件防抖延迟（同一文件的多次写入只通知一次），单位：毫秒
    #[default = 100]
    pub debounce_delay_ms: u64,
}

impl FileProviderConfig {
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }
}

/// 规范化路径 -> 调用方请求时使用的路径字符串
type PathIndex = HashMap<PathBuf, BTreeSet<String>>;

/// 文件配置源
///
/// # 示例
/// ```no_run
/// use mixcfg::cfg::{FileProvider, FileProviderConfig, Provider};
/// use std::sync::Arc;
///
/// let provider = FileProvider::new(FileProviderConfig::default());
/// let data = provider.read("conf/app.yaml").unwrap();
///
/// provider.watch(Arc::new(|path, data| {
///     println!("{} changed, {} bytes", path, data.len());
/// }));
/// ```
pub struct FileProvider {
    /// notify watcher 初始化失败时为 None，此时只读取不监听
    watching: Option<Watching>,
}

struct Watching {
    dirs: Mutex<WatchedDirs>,
    paths: Arc<RwLock<PathIndex>>,
    callback_tx: Sender<ProviderCallback>,
}

struct WatchedDirs {
    watcher: RecommendedWatcher,
    dirs: HashSet<PathBuf>,
}

impl FileProvider {
    pub fn new(config: FileProviderConfig) -> Self {
        let watching = match Watching::start(config.debounce_delay()) {
            Ok(watching) => Some(watching),
            Err(e) => {
                log::warn!("file change detection unavailable, configs will not reload: {}", e);
                None
            }
        };
        Self { watching }
    }

    /// 是否启用了变更检测
    pub fn is_watching(&self) -> bool {
        self.watching.is_some()
    }
}

impl Default for FileProvider {
    fn default() -> Self {
        Self::new(FileProviderConfig::default())
    }
}

impl_from!(FileProviderConfig => FileProvider);

impl Provider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn read(&self, path: &str) -> Result<Bytes, ProviderError> {
        if let Some(watching) = &self.watching {
            watching.watch_dir(path)?;
        }
        let data = Bytes::from(std::fs::read(path)?);
        if let Some(watching) = &self.watching {
            watching.record(path);
        }
        Ok(data)
    }

    fn watch(&self, callback: ProviderCallback) {
        if let Some(watching) = &self.watching {
            if watching.callback_tx.send(callback).is_err() {
                log::warn!("file provider event loop stopped, callback dropped");
            }
        }
    }
}

impl Watching {
    fn start(debounce_delay: Duration) -> Result<Self, ProviderError> {
        let (event_tx, event_rx) = unbounded();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = event_tx.send(event);
            }
        })?;

        let (callback_tx, callback_rx) = unbounded();
        let paths = Arc::new(RwLock::new(PathIndex::new()));
        let state = LoopState::new(paths.clone(), debounce_delay);

        thread::Builder::new()
            .name("file-provider".to_string())
            .spawn(move || run_event_loop(callback_rx, event_rx, state))?;

        Ok(Self {
            dirs: Mutex::new(WatchedDirs {
                watcher,
                dirs: HashSet::new(),
            }),
            paths,
            callback_tx,
        })
    }

    /// 监听文件所在目录
    fn watch_dir(&self, path: &str) -> Result<(), ProviderError> {
        let dir = match Path::new(path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let dir = normalize_path(dir);

        {
            let mut watched = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
            if !watched.dirs.contains(&dir) {
                watched.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
                log::debug!("watching directory {}", dir.display());
                watched.dirs.insert(dir);
            }
        }
        Ok(())
    }

    /// 记录规范化路径对应的请求路径
    fn record(&self, path: &str) {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(normalize_path(Path::new(path)))
            .or_default()
            .insert(path.to_string());
    }
}

/// 事件循环线程独占的状态
struct LoopState {
    paths: Arc<RwLock<PathIndex>>,
    debounce_delay: Duration,
    callbacks: Vec<ProviderCallback>,
    /// 最后一次通知时文件的修改时间
    watermarks: HashMap<PathBuf, SystemTime>,
    /// 等待防抖的事件：path -> 最近一次事件时间
    pending: HashMap<PathBuf, Instant>,
}

fn run_event_loop(
    callback_rx: Receiver<ProviderCallback>,
    event_rx: Receiver<notify::Event>,
    mut state: LoopState,
) {
    let tick = (state.debounce_delay / 2).max(MIN_TICK);

    loop {
        // 只有存在待防抖的事件时才需要定时唤醒
        let running = if state.pending.is_empty() {
            crossbeam::select! {
                recv(callback_rx) -> msg => state.on_callback(msg.ok()),
                recv(event_rx) -> msg => state.on_message(msg.ok()),
            }
        } else {
            crossbeam::select! {
                recv(callback_rx) -> msg => state.on_callback(msg.ok()),
                recv(event_rx) -> msg => state.on_message(msg.ok()),
                default(tick) => true,
            }
        };
        if !running {
            break;
        }
        state.flush(Instant::now());
    }

    log::debug!("file provider event loop stopped");
}

impl LoopState {
    fn new(paths: Arc<RwLock<PathIndex>>, debounce_delay: Duration) -> Self {
        Self {
            paths,
            debounce_delay,
            callbacks: Vec::new(),
            watermarks: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// 通道断开时返回 false
    fn on_callback(&mut self, callback: Option<ProviderCallback>) -> bool {
        match callback {
            Some(callback) => {
                self.callbacks.push(callback);
                true
            }
            None => false,
        }
    }

    fn on_message(&mut self, event: Option<notify::Event>) -> bool {
        match event {
            Some(event) => {
                self.on_event(event);
                true
            }
            None => false,
        }
    }

    fn on_event(&mut self, event: notify::Event) {
        if !is_write(&event.kind) {
            return;
        }

        let paths = self.paths.read().unwrap_or_else(PoisonError::into_inner);
        for path in &event.paths {
            let normalized = normalize_path(path);
            // 同目录下未被读取过的文件
            if paths.contains_key(&normalized) {
                self.pending.insert(normalized, Instant::now());
            }
        }
    }

    fn flush(&mut self, now: Instant) {
        if self.pending.is_empty() {
            return;
        }

        let delay = self.debounce_delay;
        let mut ready = Vec::new();
        self.pending.retain(|path, seen| {
            if now.duration_since(*seen) >= delay {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });

        for path in ready {
            self.trigger(&path);
        }
    }

    /// 文件修改时间超过水位时重新读取并分发，失败时静默丢弃
    fn trigger(&mut self, path: &Path) {
        let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                log::debug!("stat {} failed, change dropped: {}", path.display(), e);
                return;
            }
        };
        if let Some(last) = self.watermarks.get(path) {
            if modified <= *last {
                return;
            }
        }

        let data = match std::fs::read(path) {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                log::debug!("read {} failed, change dropped: {}", path.display(), e);
                return;
            }
        };
        self.watermarks.insert(path.to_path_buf(), modified);

        let requested: Vec<String> = self
            .paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        log::debug!(
            "{} changed, notifying {} callbacks",
            path.display(),
            self.callbacks.len()
        );
        for requested_path in requested {
            for callback in &self.callbacks {
                dispatch(callback.clone(), requested_path.clone(), data.clone());
            }
        }
    }
}

fn dispatch(callback: ProviderCallback, path: String, data: Bytes) {
    let spawned = thread::Builder::new()
        .name("file-provider-dispatch".to_string())
        .spawn(move || callback(&path, &data));
    if let Err(e) = spawned {
        log::error!("failed to spawn change dispatch: {}", e);
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

/// 规范化路径：文件存在时直接 canonicalize，否则 canonicalize 父目录再拼接文件名
fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(path) {
        return canonical;
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            dunce::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}
