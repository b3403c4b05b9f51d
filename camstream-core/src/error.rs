use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    /// 设备无法打开 (不存在、权限不足、驱动拒绝)
    #[error("Camera {index} could not be opened: {reason}")]
    Open { index: u32, reason: String },

    #[error("Device busy: Exclusive access required")]
    DeviceBusy,

    /// 名称既不在目录 (catalog) 中，也没有注册过
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    #[error("No capture device at index {0}")]
    DeviceNotFound(u32),

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Format negotiation failed: No hardware support for requested constraints")]
    FormatNotSupported,

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// 是否属于 "打开设备失败" 一类 (调用方通常映射为 503)
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::DeviceBusy | Self::DeviceNotFound(_) | Self::Disconnected(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CameraError>;
