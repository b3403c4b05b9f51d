//! 仿真驱动：不需要任何硬件，在进程内生成合成帧。
//!
//! 每个仿真设备都记录打开/释放次数，并可以在运行时注入故障
//! (打开失败、读帧失败、读帧卡顿)，用于验证流生命周期管理。
//!
//! 合成帧的每个字节都等于 `sequence % 251`，读者只要检查整帧字节是否一致，
//! 就能判断有没有读到 "写了一半" 的缓冲区。
#![warn(missing_debug_implementations, rust_2018_idioms)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use camstream_core::builder::CaptureConfig;
use camstream_core::error::{CameraError, Result};
use camstream_core::frame::Frame;
use camstream_core::pixel_format::{FourCC, PixelFormat};
use camstream_core::traits::{CaptureDevice, DeviceInfo, Driver};

/// 仿真设备的静态参数
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl SimulatedDevice {
    pub fn new(width: u32, height: u32, format: impl Into<PixelFormat>) -> Self {
        Self {
            name: "Simulated Camera".to_string(),
            width,
            height,
            format: format.into(),
        }
    }

    /// 320x240 RGB24，与标准采集配置一致
    pub fn qvga() -> Self {
        Self::new(320, 240, FourCC::RGB3)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 合成帧的负载长度；压缩/未知格式给一个固定大小
    fn payload_len(&self) -> usize {
        self.format
            .frame_len(self.width, self.height)
            .unwrap_or(4096)
    }
}

/// 单个设备的运行时状态
#[derive(Debug)]
struct DeviceSlot {
    spec: SimulatedDevice,
    open: bool,
    opened: u64,
    released: u64,
    reads: u64,
    sequence: u64,
    fail_open: bool,
    fail_reads: bool,
    read_delay: Duration,
}

impl DeviceSlot {
    fn new(spec: SimulatedDevice) -> Self {
        Self {
            spec,
            open: false,
            opened: 0,
            released: 0,
            reads: 0,
            sequence: 0,
            fail_open: false,
            fail_reads: false,
            read_delay: Duration::ZERO,
        }
    }
}

type Slots = Arc<Mutex<BTreeMap<u32, DeviceSlot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, BTreeMap<u32, DeviceSlot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 仿真驱动。克隆后共享同一组设备，测试代码可以一边把驱动交给注册表，
/// 一边保留一个克隆用来注入故障和检查计数器。
#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    slots: Slots,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在指定索引上挂一个仿真设备
    pub fn with_device(self, index: u32, spec: SimulatedDevice) -> Self {
        lock(&self.slots).insert(index, DeviceSlot::new(spec));
        self
    }

    /// 下一次 open 是否失败
    pub fn set_open_failure(&self, index: u32, fail: bool) {
        self.update(index, |slot| slot.fail_open = fail);
    }

    /// 读帧是否持续失败
    pub fn set_read_failures(&self, index: u32, fail: bool) {
        self.update(index, |slot| slot.fail_reads = fail);
    }

    /// 每次读帧的阻塞时间，用于模拟卡顿的设备
    pub fn set_read_delay(&self, index: u32, delay: Duration) {
        self.update(index, |slot| slot.read_delay = delay);
    }

    /// 累计打开次数
    pub fn opened(&self, index: u32) -> u64 {
        self.inspect(index, |slot| slot.opened)
    }

    /// 累计释放次数
    pub fn released(&self, index: u32) -> u64 {
        self.inspect(index, |slot| slot.released)
    }

    /// 当前是否有句柄持有该设备
    pub fn is_open(&self, index: u32) -> bool {
        self.inspect(index, |slot| slot.open)
    }

    /// 累计读帧次数 (含失败)
    pub fn reads(&self, index: u32) -> u64 {
        self.inspect(index, |slot| slot.reads)
    }

    fn update(&self, index: u32, f: impl FnOnce(&mut DeviceSlot)) {
        if let Some(slot) = lock(&self.slots).get_mut(&index) {
            f(slot);
        }
    }

    fn inspect<T: Default>(&self, index: u32, f: impl FnOnce(&DeviceSlot) -> T) -> T {
        lock(&self.slots).get(&index).map(f).unwrap_or_default()
    }

    fn info(index: u32, spec: &SimulatedDevice) -> DeviceInfo {
        DeviceInfo {
            index,
            name: spec.name.clone(),
            id: format!("sim://{}", index),
            backend: "Simulation".to_string(),
            bus_info: None,
        }
    }
}

impl Driver for SimulatedDriver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(lock(&self.slots)
            .iter()
            .map(|(index, slot)| Self::info(*index, &slot.spec))
            .collect())
    }

    fn open(&self, index: u32, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        let mut slots = lock(&self.slots);
        let slot = slots.get_mut(&index).ok_or_else(|| CameraError::Open {
            index,
            reason: format!("sim://{} not found", index),
        })?;

        if slot.fail_open {
            return Err(CameraError::Open {
                index,
                reason: "simulated open failure".to_string(),
            });
        }
        // 与真实设备一样：同一时刻只允许一个句柄
        if slot.open {
            return Err(CameraError::DeviceBusy);
        }

        slot.open = true;
        slot.opened += 1;
        // 每个新句柄的帧序号从头开始
        slot.sequence = 0;

        let info = Self::info(index, &slot.spec);
        tracing::debug!(target: "camstream::simulation", "Camera opened: {}", info.id);

        Ok(Box::new(SimulatedCapture {
            slots: self.slots.clone(),
            index,
            info,
            read_timeout: config.read_timeout,
        }))
    }
}

/// 仿真设备句柄，Drop 时释放设备
#[derive(Debug)]
pub struct SimulatedCapture {
    slots: Slots,
    index: u32,
    info: DeviceInfo,
    read_timeout: Option<Duration>,
}

impl CaptureDevice for SimulatedCapture {
    fn read(&mut self) -> Result<Option<Frame>> {
        let delay = lock(&self.slots)
            .get(&self.index)
            .map(|slot| slot.read_delay)
            .ok_or_else(|| CameraError::Disconnected(self.info.id.clone()))?;

        // 读帧期限：超过 read_timeout 的卡顿按 "本轮无帧" 处理
        if !delay.is_zero() {
            let wait = self.read_timeout.map_or(delay, |t| t.min(delay));
            std::thread::sleep(wait);
            if wait < delay {
                if let Some(slot) = lock(&self.slots).get_mut(&self.index) {
                    slot.reads += 1;
                }
                return Ok(None);
            }
        }

        let mut slots = lock(&self.slots);
        let slot = slots
            .get_mut(&self.index)
            .ok_or_else(|| CameraError::Disconnected(self.info.id.clone()))?;
        slot.reads += 1;

        if slot.fail_reads {
            return Err(CameraError::Io(std::io::Error::other("simulated read failure")));
        }

        slot.sequence += 1;
        let fill = (slot.sequence % 251) as u8;
        let data = Bytes::from(vec![fill; slot.spec.payload_len()]);

        Ok(Some(Frame::new(
            data,
            slot.spec.width,
            slot.spec.height,
            slot.spec.format,
            slot.sequence,
        )))
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

impl Drop for SimulatedCapture {
    fn drop(&mut self) {
        if let Some(slot) = lock(&self.slots).get_mut(&self.index) {
            slot.open = false;
            slot.released += 1;
        }
        tracing::debug!(target: "camstream::simulation", "Camera released: {}", self.info.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> SimulatedDriver {
        SimulatedDriver::new().with_device(0, SimulatedDevice::qvga())
    }

    #[test]
    fn open_is_exclusive_and_release_is_counted() {
        let driver = driver();
        let config = CaptureConfig::standard();

        let first = driver.open(0, &config).expect("first open");
        assert!(matches!(driver.open(0, &config), Err(CameraError::DeviceBusy)));
        assert!(driver.is_open(0));

        drop(first);
        assert!(!driver.is_open(0));
        assert_eq!(driver.opened(0), 1);
        assert_eq!(driver.released(0), 1);
    }

    #[test]
    fn frames_are_uniformly_filled() {
        let driver = driver();
        let mut device = driver.open(0, &CaptureConfig::standard()).expect("open");

        let frame = device.read().expect("read").expect("frame");
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.data.len(), 320 * 240 * 3);
        assert!(frame.data.iter().all(|b| *b == 1));
    }

    #[test]
    fn stalled_reads_respect_the_deadline() {
        let driver = driver();
        driver.set_read_delay(0, Duration::from_secs(30));
        let config = CaptureConfig::standard().read_timeout(Some(Duration::from_millis(20)));
        let mut device = driver.open(0, &config).expect("open");

        assert!(device.read().expect("read").is_none());
        assert_eq!(driver.reads(0), 1);
    }

    #[test]
    fn injected_failures() {
        let driver = driver();
        driver.set_open_failure(0, true);
        assert!(matches!(
            driver.open(0, &CaptureConfig::standard()),
            Err(CameraError::Open { index: 0, .. })
        ));

        driver.set_open_failure(0, false);
        driver.set_read_failures(0, true);
        let mut device = driver.open(0, &CaptureConfig::standard()).expect("open");
        assert!(device.read().is_err());
    }

    #[test]
    fn probe_uses_the_device_list() {
        let driver = driver();
        assert_eq!(driver.probe(0).expect("probe").id, "sim://0");
        assert!(matches!(driver.probe(3), Err(CameraError::DeviceNotFound(3))));
    }
}
