//! 名称 -> CameraStream 注册表
//!
//! 结构性修改 (resolve 插入、shutdown_all 清空) 在注册表锁内串行执行；
//! 单路流的 start/stop/get_frame 不经过注册表锁。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use camstream_core::error::{CameraError, Result};
use camstream_core::telemetry::StreamTelemetry;
use camstream_core::traits::Driver;

use crate::internal::sync::lock;
use crate::videoio::{CameraStream, StreamConfig};

/// 单路流的状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct CameraStatus {
    pub name: String,
    pub device_index: u32,
    pub running: bool,
    pub telemetry: StreamTelemetry,
}

pub struct CameraRegistry {
    driver: Arc<dyn Driver>,
    config: StreamConfig,
    // 静态目录：名称 -> 设备索引
    catalog: Mutex<BTreeMap<String, u32>>,
    streams: Mutex<HashMap<String, Arc<CameraStream>>>,
}

impl std::fmt::Debug for CameraRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let catalog = self.catalog();
        f.debug_struct("CameraRegistry")
            .field("catalog", &catalog)
            .field("registered", &self.names())
            .finish()
    }
}

impl CameraRegistry {
    pub fn new(driver: Arc<dyn Driver>, config: StreamConfig) -> Self {
        Self {
            driver,
            config,
            catalog: Mutex::new(BTreeMap::new()),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// 声明目录 (启动时由外部提供一次)。再次调用会替换整张表，已注册的流不受影响
    pub fn declare_catalog<I, S>(&self, entries: I)
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let catalog: BTreeMap<String, u32> =
            entries.into_iter().map(|(name, index)| (name.into(), index)).collect();
        tracing::info!("Camera catalog declared: {:?}", catalog);
        *lock(&self.catalog) = catalog;
    }

    pub fn catalog(&self) -> BTreeMap<String, u32> {
        lock(&self.catalog).clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// 为目录中每个尚未注册的名称创建流 (不启动)。
    ///
    /// 某个设备探测失败只记录日志并继续，最后汇总为一个布尔值。
    pub fn initialize_all(&self) -> bool {
        let catalog = self.catalog();
        let mut streams = lock(&self.streams);
        let mut ok = true;

        tracing::info!("Initializing {} cameras", catalog.len());
        for (name, index) in catalog {
            if streams.contains_key(&name) {
                continue;
            }

            match self.driver.probe(index) {
                Ok(info) => {
                    streams.insert(name.clone(), Arc::new(self.build(&name, index)));
                    tracing::info!("Initialized camera {} -> {} ({})", name, info.id, info.name);
                }
                Err(e) => {
                    ok = false;
                    tracing::warn!("Failed to initialize camera {} (index {}): {}", name, index, e);
                }
            }
        }

        ok
    }

    /// 按名称取流；不存在时按目录索引创建 (不启动)。
    pub fn resolve(&self, name: &str) -> Result<Arc<CameraStream>> {
        let mut streams = lock(&self.streams);
        if let Some(stream) = streams.get(name) {
            return Ok(stream.clone());
        }

        let index = lock(&self.catalog)
            .get(name)
            .copied()
            .ok_or_else(|| CameraError::UnknownCamera(name.to_string()))?;

        let stream = Arc::new(self.build(name, index));
        streams.insert(name.to_string(), stream.clone());
        tracing::debug!("Registered camera {} (index {})", name, index);
        Ok(stream)
    }

    /// resolve 之后确保流在运行。可重复调用
    pub fn ensure_running(&self, name: &str) -> Result<Arc<CameraStream>> {
        let stream = self.resolve(name)?;
        self.start_registered(name, &stream)?;
        Ok(stream)
    }

    /// 启动一个已注册的流。
    ///
    /// 打开设备时不持有注册表锁，期间 shutdown_all 可能已经把它移出注册表；
    /// 这种情况下立即停掉它，否则设备会被一个谁也找不到的流一直占着。
    fn start_registered(&self, name: &str, stream: &Arc<CameraStream>) -> Result<()> {
        stream.start()?;

        let registered = lock(&self.streams)
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, stream));
        if !registered {
            tracing::info!("Camera {} was shut down while starting, releasing it", name);
            stream.stop();
            return Err(CameraError::Disconnected(name.to_string()));
        }
        Ok(())
    }

    /// 停止所有流、释放所有设备并清空注册表。可重复调用
    pub fn shutdown_all(&self) {
        let mut streams = lock(&self.streams);
        if streams.is_empty() {
            return;
        }

        // 先统一发出停止信号，再逐个等待，总耗时约等于最慢的那一路
        for stream in streams.values() {
            stream.request_stop();
        }
        for (name, stream) in streams.drain() {
            tracing::info!("Stopping camera {}", name);
            stream.stop();
        }
        tracing::info!("All cameras released");
    }

    /// 已注册的名称 (排序后)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.streams).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<CameraStream>> {
        lock(&self.streams).get(name).cloned()
    }

    pub fn snapshot(&self) -> Vec<CameraStatus> {
        let mut status: Vec<CameraStatus> = lock(&self.streams)
            .values()
            .map(|s| CameraStatus {
                name: s.name().to_string(),
                device_index: s.device_index(),
                running: s.is_running(),
                telemetry: s.telemetry(),
            })
            .collect();
        status.sort_by(|a, b| a.name.cmp(&b.name));
        status
    }

    fn build(&self, name: &str, index: u32) -> CameraStream {
        CameraStream::new(name, index, self.driver.clone(), self.config.clone())
    }
}
