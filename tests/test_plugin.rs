//! 从配置文件初始化插件的集成测试

use anyhow::Result;
use mixcfg::cfg::{ConfigLoader, LoadOptions, Receiver};
use mixcfg::plugin::{MetricsPlugin, PluginRegistry, Plugins};
use serde::Deserialize;
use std::fs;
use std::sync::{Arc, RwLock};
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    name: String,
    #[serde(default)]
    plugins: Plugins,
}

#[test]
fn test_metrics_plugin_from_config_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("app.yaml");
    fs::write(
        &path,
        r#"
name: demo
plugins:
  metrics:
    endpoint: "127.0.0.1:0"
    namespace: demo
    counters:
      - opts:
          name: requests_total
          help: handled requests
        labels: [code]
"#,
    )?;

    let target = Arc::new(RwLock::new(AppConfig::default()));
    let receiver: Arc<dyn Receiver> = target.clone();
    ConfigLoader::with_defaults().load(
        &path.to_string_lossy(),
        LoadOptions::new()
            .with_receiver(receiver)
            .with_disable_watch(true),
    )?;

    let metrics = Arc::new(MetricsPlugin::new());
    let registry = PluginRegistry::new();
    registry.register(metrics.clone());

    let app = target.read().unwrap();
    assert_eq!(app.name, "demo");
    app.plugins.setup(&registry)?;

    let requests = metrics.counter("requests_total").expect("counter registered");
    requests.with_label_values(&["200"]).inc();

    let addr = metrics.local_addr().expect("metrics endpoint bound");
    let body = reqwest::blocking::get(format!("http://{}/metrics", addr))?.text()?;
    assert!(body.contains("# HELP demo_requests_total handled requests"));
    assert!(body.contains(r#"demo_requests_total{code="200"} 1"#));
    Ok(())
}

#[test]
fn test_unregistered_plugin_in_config() -> Result<()> {
    let plugins: Plugins = serde_yaml::from_str("tracing:\n  sample: 1\n")?;
    let err = plugins.setup(&PluginRegistry::new()).unwrap_err();
    assert_eq!(err.to_string(), "plugin for tracing not registered");
    Ok(())
}
