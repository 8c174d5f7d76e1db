//! 基于真实文件的配置加载集成测试

use anyhow::Result;
use arc_swap::ArcSwap;
use mixcfg::cfg::{self, CacheKey, ConfigError, ConfigLoader, LoadOptions, Receiver};
use serde::Deserialize;
use serial_test::serial;
use std::fs;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
struct AppConfig {
    name: String,
    #[serde(default)]
    port: u16,
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    check()
}

fn receiver_of<T: Send + Sync + 'static>(target: &Arc<RwLock<T>>) -> Arc<dyn Receiver>
where
    RwLock<T>: Receiver,
{
    target.clone()
}

#[test]
#[serial]
fn test_default_loader_reloads_on_change() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("a.yaml");
    fs::write(&path, "name: x\n")?;
    let path = path.to_string_lossy().to_string();

    let target = Arc::new(RwLock::new(AppConfig::default()));
    let config = cfg::load(&path, LoadOptions::new().with_receiver(receiver_of(&target)))?;
    assert_eq!(target.read().unwrap().name, "x");
    assert_eq!(config.raw_data(), b"name: x\n");
    assert_eq!(config.provider_name(), "file");
    assert_eq!(config.codec_name(), "yaml");

    // 缓存命中返回同一个实例
    let again = cfg::load(&path, LoadOptions::new().with_receiver(receiver_of(&target)))?;
    assert!(mixcfg::Config::ptr_eq(&config, &again));

    // 等待目录监听生效
    thread::sleep(Duration::from_millis(200));
    fs::write(&path, "name: y\n")?;

    assert!(wait_until(Duration::from_secs(5), || {
        target.read().unwrap().name == "y"
    }));

    let key = CacheKey::new("file", "yaml", path.as_str());
    assert!(wait_until(Duration::from_secs(5), || {
        cfg::default_loader()
            .cached(&key)
            .map(|config| config.raw_data() == b"name: y\n")
            .unwrap_or(false)
    }));
    Ok(())
}

#[test]
#[serial]
fn test_reload_recovers_after_broken_save() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("c.yaml");
    fs::write(&path, "name: x\n")?;
    let path = path.to_string_lossy().to_string();

    let loader = ConfigLoader::with_defaults();
    let target = Arc::new(RwLock::new(AppConfig::default()));
    loader.load(&path, LoadOptions::new().with_receiver(receiver_of(&target)))?;

    thread::sleep(Duration::from_millis(200));
    fs::write(&path, "name: [broken\n")?;
    assert!(wait_until(Duration::from_secs(5), || loader.is_empty()));
    assert_eq!(target.read().unwrap().name, "x");

    // 修改时间需要前进，避免被水位过滤
    thread::sleep(Duration::from_millis(50));
    fs::write(&path, "name: fixed\n")?;
    assert!(wait_until(Duration::from_secs(5), || {
        target.read().unwrap().name == "fixed"
    }));
    assert!(wait_until(Duration::from_secs(5), || loader.len() == 1));
    Ok(())
}

#[test]
#[serial]
fn test_disable_watch_only_evicts() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("b.yaml");
    fs::write(&path, "name: x\nport: 80\n")?;
    let path = path.to_string_lossy().to_string();

    let loader = ConfigLoader::with_defaults();
    let target = Arc::new(RwLock::new(AppConfig::default()));
    loader.load(
        &path,
        LoadOptions::new()
            .with_receiver(receiver_of(&target))
            .with_disable_watch(true),
    )?;
    assert_eq!(loader.len(), 1);

    thread::sleep(Duration::from_millis(200));
    fs::write(&path, "name: y\nport: 81\n")?;

    assert!(wait_until(Duration::from_secs(5), || loader.is_empty()));
    // 不会在后台重新加载
    thread::sleep(Duration::from_millis(300));
    assert!(loader.is_empty());
    assert_eq!(
        *target.read().unwrap(),
        AppConfig {
            name: "x".to_string(),
            port: 80
        }
    );

    // 显式加载读到新内容
    loader.load(&path, LoadOptions::new().with_receiver(receiver_of(&target)))?;
    assert_eq!(target.read().unwrap().port, 81);
    Ok(())
}

#[test]
fn test_malformed_yaml_is_not_cached() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("bad.yaml");
    fs::write(&path, "name: [x\n")?;
    let path = path.to_string_lossy().to_string();

    let loader = ConfigLoader::with_defaults();
    let target = Arc::new(RwLock::new(AppConfig::default()));
    let err = loader
        .load(&path, LoadOptions::new().with_receiver(receiver_of(&target)))
        .unwrap_err();

    assert!(matches!(err, ConfigError::Decode { .. }));
    assert!(err.to_string().contains(&path));
    assert!(loader.is_empty());
    assert_eq!(*target.read().unwrap(), AppConfig::default());
    Ok(())
}

#[test]
fn test_missing_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("missing.yaml");
    let path = path.to_string_lossy().to_string();

    let loader = ConfigLoader::with_defaults();
    let target = Arc::new(RwLock::new(AppConfig::default()));
    let err = loader
        .load(&path, LoadOptions::new().with_receiver(receiver_of(&target)))
        .unwrap_err();

    assert!(matches!(err, ConfigError::SourceRead { .. }));
    assert!(loader.is_empty());
    Ok(())
}

#[test]
fn test_json_and_toml_codecs() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let json_path = temp_dir.path().join("app.json");
    let toml_path = temp_dir.path().join("app.toml");
    fs::write(&json_path, r#"{"name": "json", "port": 8080}"#)?;
    fs::write(&toml_path, "name = \"toml\"\nport = 9090\n")?;

    let loader = ConfigLoader::with_defaults();

    let from_json = Arc::new(RwLock::new(AppConfig::default()));
    let config = loader.load(
        &json_path.to_string_lossy(),
        LoadOptions::new()
            .with_codec("json")
            .with_receiver(receiver_of(&from_json)),
    )?;
    assert_eq!(config.codec_name(), "json");
    assert_eq!(from_json.read().unwrap().port, 8080);

    let from_toml = Arc::new(ArcSwap::from_pointee(AppConfig::default()));
    let receiver: Arc<dyn Receiver> = from_toml.clone();
    loader.load(
        &toml_path.to_string_lossy(),
        LoadOptions::new().with_codec("toml").with_receiver(receiver),
    )?;
    assert_eq!(from_toml.load().name, "toml");
    assert_eq!(from_toml.load().port, 9090);

    assert_eq!(loader.len(), 2);
    Ok(())
}

#[test]
fn test_unknown_codec_fails_before_read() {
    let loader = ConfigLoader::with_defaults();
    let target = Arc::new(RwLock::new(AppConfig::default()));
    let err = loader
        .load(
            "/definitely/not/here.ini",
            LoadOptions::new()
                .with_codec("ini")
                .with_receiver(receiver_of(&target)),
        )
        .unwrap_err();

    assert!(matches!(err, ConfigError::CodecNotRegistered(ref name) if name == "ini"));
}
