// camstream/examples/camera_demo.rs
//
// 不需要硬件：用仿真后端跑一遍完整的生命周期
//   cargo run -p camstream --example camera_demo --features simulation

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use camstream::prelude::*;
use camstream::videoio::backend::{create_driver, BackendType};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // 1. 仿真驱动 + 注册表。空闲超时调短，便于观察设备被自动释放
    let driver = create_driver(BackendType::Simulation, &[0, 2])?;
    let config = StreamConfig {
        idle_timeout: Duration::from_secs(2),
        ..StreamConfig::default()
    };
    let registry = Arc::new(CameraRegistry::new(driver, config));
    registry.declare_catalog([("camera1", 0), ("camera2", 2)]);

    println!("Initialized: {}", registry.initialize_all());

    // 2. 相当于一个 HTTP 连接：确保流在运行，然后拉 20 个分块
    let stream = {
        let registry = registry.clone();
        tokio::task::spawn_blocking(move || registry.ensure_running("camera1")).await??
    };

    let mut generator = StreamGenerator::new(stream.clone());
    let mut received = 0usize;
    while received < 20 {
        let Some(chunk) = generator.next_chunk().await else {
            break;
        };
        received += 1;
        println!("chunk #{:02}: {} bytes", received, chunk.len());
    }

    // 3. 断开连接，等待空闲超时
    drop(generator);
    println!("Viewer disconnected, waiting for idle timeout...");
    while stream.is_running() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    println!("camera1 released after {:?} idle", stream.idle_for());

    for status in registry.snapshot() {
        println!(
            "{} (index {}): running={} {:?}",
            status.name, status.device_index, status.running, status.telemetry
        );
    }

    // 4. 进程退出前释放所有设备
    tokio::task::spawn_blocking(move || registry.shutdown_all()).await?;
    Ok(())
}
