//! 监听配置文件变化并自动重新加载
//!
//! ```bash
//! cargo run --example watch_reload -- app.yaml
//! ```
//!
//! 运行期间修改 app.yaml，新的配置会被打印出来

use anyhow::Result;
use mixcfg::{LoadOptions, Receiver};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
struct AppConfig {
    name: String,
    port: u16,
    debug: bool,
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "app.yaml".to_string());

    if !std::path::Path::new(&path).exists() {
        std::fs::write(&path, "name: demo\nport: 8080\ndebug: false\n")?;
        println!("created {}", path);
    }

    let target = Arc::new(RwLock::new(AppConfig::default()));
    let receiver: Arc<dyn Receiver> = target.clone();
    mixcfg::load(&path, LoadOptions::new().with_receiver(receiver))?;

    let mut last = target.read().unwrap().clone();
    println!("loaded: {:?}", last);

    loop {
        thread::sleep(Duration::from_millis(500));
        let current = target.read().unwrap().clone();
        if current != last {
            println!("reloaded: {:?}", current);
            last = current;
        }
    }
}
