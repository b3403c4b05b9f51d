use crate::builder::CaptureConfig;
use crate::error::{CameraError, Result};
use crate::frame::Frame;

/// 设备基本信息
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// 设备索引 (e.g. /dev/video2 -> 2)，目录 (catalog) 里配置的就是这个值
    pub index: u32,

    /// 对用户友好的显示名称 (e.g. "Logitech C920")
    pub name: String,

    /// 唯一硬件 ID (e.g. "/dev/video0")
    pub id: String,

    /// 后端类型标识 (e.g. "V4L2", "Simulation")
    pub backend: String,

    /// 硬件总线信息 (可选，e.g. "usb-0000:00:14.0-1")
    pub bus_info: Option<String>,
}

/// 1. 驱动入口：设备枚举与打开
pub trait Driver: Send + Sync {
    /// 扫描总线，返回可采集的设备列表
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// 检查某个索引上是否存在可用设备 (不占用设备)
    fn probe(&self, index: u32) -> Result<DeviceInfo> {
        self.list_devices()?
            .into_iter()
            .find(|dev| dev.index == index)
            .ok_or(CameraError::DeviceNotFound(index))
    }

    /// 打开设备并应用采集配置，返回独占的设备句柄。
    /// 句柄被 Drop 时即释放设备。
    fn open(&self, index: u32, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>>;
}

/// 2. 数据面：独占的设备句柄
///
/// `read` 是阻塞调用，只应在专用采集线程里使用。
pub trait CaptureDevice: Send {
    /// 读取一帧。
    ///
    /// * `Ok(Some(frame))` - 读取成功
    /// * `Ok(None)` - 本次没有拿到帧 (超时、驱动丢帧)，属于瞬时情况
    /// * `Err(e)` - 读取出错，调用方可以选择重试
    fn read(&mut self) -> Result<Option<Frame>>;

    /// 设备信息
    fn info(&self) -> &DeviceInfo;
}

// 为 Box<T> 实现 CaptureDevice，这样 Box<dyn CaptureDevice> 也能被当做 CaptureDevice 使用
impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn read(&mut self) -> Result<Option<Frame>> {
        (**self).read()
    }

    fn info(&self) -> &DeviceInfo {
        (**self).info()
    }
}
