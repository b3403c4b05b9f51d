//! Linux V4L2 后端：按索引打开 /dev/videoN，协商格式，使用 mmap 采集。
#![cfg(target_os = "linux")]

pub mod device;
pub mod pixel_map;
pub mod stream;

use camstream_core::builder::CaptureConfig;
use camstream_core::error::Result;
use camstream_core::traits::{CaptureDevice, DeviceInfo, Driver};
use std::sync::Arc;

/// V4L2 驱动结构体 (无状态，可随意克隆)
#[derive(Debug, Clone)]
pub struct V4l2Driver;

impl Default for V4l2Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2Driver {
    pub fn new() -> Self {
        Self
    }
}

// 实现 Driver Trait
impl Driver for V4l2Driver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        device::list_devices()
    }

    fn probe(&self, index: u32) -> Result<DeviceInfo> {
        device::probe(index)
    }

    fn open(&self, index: u32, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        device::open(index, config)
    }
}

// 为了方便直接使用，提供一个默认实例
pub fn default_driver() -> Arc<dyn Driver> {
    Arc::new(V4l2Driver::new())
}
