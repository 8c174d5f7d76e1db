//! plugin 模块 - 由配置片段驱动初始化的插件
//!
//! 配置文件中 `plugins` 下的每个键对应一个已注册的插件，
//! 值作为该插件的配置交给它自己解析

pub mod global;
pub mod metrics;
pub mod registry;

pub use global::{plugins, register, setup};
pub use metrics::{MetricsConfig, MetricsPlugin};
pub use registry::{Plugin, PluginError, PluginRegistry, Plugins};
