//! camstream: 多路摄像头 MJPEG 推流，无人观看时自动释放设备。
//!
//! 组成 (从底层到上层)：
//! - [`imgcodecs`]: 帧编码 (Raw -> JPEG)
//! - [`videoio::CameraStream`]: 独占一个设备，后台线程采集最新帧，空闲超时自动停止
//! - [`registry::CameraRegistry`]: 名称 -> CameraStream 的映射，按需创建
//! - [`mjpeg::StreamGenerator`]: 每个 HTTP 连接一个，拉取帧、编码、输出 multipart 分块
#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod imgcodecs;
pub(crate) mod internal;
pub mod mjpeg;
pub mod registry;
pub mod videoio;

// Re-export 核心类型
pub use camstream_core::error::{CameraError, Result};
pub use camstream_core::frame::Frame;

/// 预置模块，用户可以通过 `use camstream::prelude::*;` 导入常用项
pub mod prelude {
    pub use crate::imgcodecs::{FrameEncoder, JpegEncoder};
    pub use crate::mjpeg::{StreamGenerator, MULTIPART_CONTENT_TYPE};
    pub use crate::registry::{CameraRegistry, CameraStatus};
    pub use crate::videoio::{CameraStream, StreamConfig};
    pub use camstream_core::prelude::*;
}
