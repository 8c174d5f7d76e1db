//! Metrics 插件
//!
//! 按配置注册 Prometheus counter 和 histogram，并提供 HTTP 拉取端点
//!
//! ```yaml
//! plugins:
//!   metrics:
//!     endpoint: ":9090"
//!     path: /metrics
//!     namespace: app
//!     counters:
//!       - opts: { name: requests_total, help: "total requests" }
//!         labels: [method]
//!     histograms:
//!       - opts: { name: latency_seconds, buckets: [0.01, 0.1, 1] }
//!         labels: [method]
//! ```

use anyhow::{anyhow, bail, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use garde::Validate;
use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use smart_default::SmartDefault;
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

use super::registry::Plugin;

/// Metrics 插件配置
#[derive(Debug, Clone, Deserialize, SmartDefault, Validate, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// 监听地址，兼容 `:9090` 写法
    #[default = "0.0.0.0:9090"]
    #[garde(length(min = 1))]
    pub endpoint: String,

    /// 拉取路径
    #[default = "/metrics"]
    #[garde(pattern(r"^/"))]
    pub path: String,

    /// 指标未设置 namespace 时使用
    #[garde(skip)]
    pub namespace: String,

    /// 指标未设置 subsystem 时使用
    #[garde(skip)]
    pub subsystem: String,

    #[garde(dive)]
    pub counters: Vec<CounterConfig>,

    #[garde(dive)]
    pub histograms: Vec<HistogramConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct MetricOpts {
    #[garde(skip)]
    pub namespace: String,
    #[garde(skip)]
    pub subsystem: String,
    #[garde(length(min = 1))]
    pub name: String,
    /// 为空时使用 name
    #[garde(skip)]
    pub help: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct CounterConfig {
    #[garde(dive)]
    pub opts: MetricOpts,
    #[garde(skip)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct HistogramMetricOpts {
    #[garde(skip)]
    pub namespace: String,
    #[garde(skip)]
    pub subsystem: String,
    #[garde(length(min = 1))]
    pub name: String,
    #[garde(skip)]
    pub help: String,
    /// 为空时使用 Prometheus 默认分桶
    #[garde(skip)]
    pub buckets: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct HistogramConfig {
    #[garde(dive)]
    pub opts: HistogramMetricOpts,
    #[garde(skip)]
    pub labels: Vec<String>,
}

/// Metrics 插件
///
/// 每个实例只能初始化一次
#[derive(Default)]
pub struct MetricsPlugin {
    state: RwLock<Option<MetricsState>>,
}

struct MetricsState {
    registry: Registry,
    counters: HashMap<String, CounterVec>,
    histograms: HashMap<String, HistogramVec>,
    local_addr: SocketAddr,
}

static GLOBAL_METRICS: Lazy<Arc<MetricsPlugin>> = Lazy::new(|| Arc::new(MetricsPlugin::new()));

/// 全局 metrics 插件，注册在全局插件注册表中
pub fn global() -> Arc<MetricsPlugin> {
    GLOBAL_METRICS.clone()
}

/// 从全局 metrics 插件获取 counter
pub fn counter(name: &str) -> Option<CounterVec> {
    GLOBAL_METRICS.counter(name)
}

/// 从全局 metrics 插件获取 histogram
pub fn histogram(name: &str) -> Option<HistogramVec> {
    GLOBAL_METRICS.histogram(name)
}

impl MetricsPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> Option<CounterVec> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|state| state.counters.get(name).cloned())
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramVec> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|state| state.histograms.get(name).cloned())
    }

    /// HTTP 端点实际监听的地址
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|state| state.local_addr)
    }

    /// 以 Prometheus 文本格式输出当前指标
    pub fn render(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.as_ref().and_then(|state| encode(&state.registry).ok())
    }

    pub fn setup_with(&self, config: MetricsConfig) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            bail!("metrics plugin already set up");
        }
        config.validate()?;

        let registry = Registry::new();

        let mut counters = HashMap::new();
        for counter in &config.counters {
            let opts = &counter.opts;
            let metric_opts = Opts::new(opts.name.clone(), help_or_name(&opts.help, &opts.name))
                .namespace(or_default(&opts.namespace, &config.namespace))
                .subsystem(or_default(&opts.subsystem, &config.subsystem));
            let labels: Vec<&str> = counter.labels.iter().map(String::as_str).collect();
            let vec = CounterVec::new(metric_opts, &labels)?;
            registry.register(Box::new(vec.clone()))?;
            counters.insert(opts.name.clone(), vec);
        }

        let mut histograms = HashMap::new();
        for histogram in &config.histograms {
            let opts = &histogram.opts;
            let mut metric_opts =
                HistogramOpts::new(opts.name.clone(), help_or_name(&opts.help, &opts.name))
                    .namespace(or_default(&opts.namespace, &config.namespace))
                    .subsystem(or_default(&opts.subsystem, &config.subsystem));
            if !opts.buckets.is_empty() {
                metric_opts = metric_opts.buckets(opts.buckets.clone());
            }
            let labels: Vec<&str> = histogram.labels.iter().map(String::as_str).collect();
            let vec = HistogramVec::new(metric_opts, &labels)?;
            registry.register(Box::new(vec.clone()))?;
            histograms.insert(opts.name.clone(), vec);
        }

        let addr = listen_addr(&config.endpoint);
        let listener =
            TcpListener::bind(&addr).map_err(|e| anyhow!("bind metrics endpoint {}: {}", addr, e))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        serve(listener, &config.path, registry.clone())?;
        log::debug!(
            "metrics served on http://{}{}, {} counters, {} histograms",
            local_addr,
            config.path,
            counters.len(),
            histograms.len()
        );

        *state = Some(MetricsState {
            registry,
            counters,
            histograms,
            local_addr,
        });
        Ok(())
    }
}

impl Plugin for MetricsPlugin {
    fn name(&self) -> &str {
        "metrics"
    }

    fn setup(&self, config: &YamlValue) -> Result<()> {
        let config: MetricsConfig = if config.is_null() {
            MetricsConfig::default()
        } else {
            serde_yaml::from_value(config.clone())?
        };
        self.setup_with(config)
    }
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn help_or_name(help: &str, name: &str) -> String {
    or_default(help, name)
}

fn listen_addr(endpoint: &str) -> String {
    if endpoint.starts_with(':') {
        format!("0.0.0.0{}", endpoint)
    } else {
        endpoint.to_string()
    }
}

fn encode(registry: &Registry) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

async fn metrics_handler(State(registry): State<Registry>) -> Result<impl IntoResponse, StatusCode> {
    let body = encode(&registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    ))
}

/// 在独立线程的 Tokio runtime 上提供拉取端点
fn serve(listener: TcpListener, path: &str, registry: Registry) -> std::io::Result<()> {
    let app = Router::new()
        .route(path, get(metrics_handler))
        .with_state(registry);

    thread::Builder::new()
        .name("metrics-server".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::error!("failed to start metrics runtime: {}", e);
                    return;
                }
            };

            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(e) => {
                        log::error!("failed to register metrics listener: {}", e);
                        return;
                    }
                };
                if let Err(e) = axum::serve(listener, app).await {
                    log::error!("metrics server error: {}", e);
                }
            });
        })?;

    Ok(())
}
