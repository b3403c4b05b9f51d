// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

// 模块定义
pub mod builder;
pub mod error;
pub mod frame;
pub mod pixel_format;
pub mod telemetry;
pub mod traits;

// 方便用户使用的 Prelude
pub mod prelude {
    pub use crate::builder::{CaptureConfig, Priority};
    pub use crate::error::{CameraError, Result};
    pub use crate::frame::Frame;
    pub use crate::pixel_format::{FourCC, PixelFormat};
    pub use crate::telemetry::{StreamHealth, StreamTelemetry};
    pub use crate::traits::{CaptureDevice, DeviceInfo, Driver};
}

// 版本与构建信息常量
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
