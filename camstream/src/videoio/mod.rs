pub mod backend;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use camstream_core::builder::CaptureConfig;
use camstream_core::error::{CameraError, Result};
use camstream_core::frame::Frame;
use camstream_core::telemetry::StreamTelemetry;
use camstream_core::traits::{CaptureDevice, Driver};

use crate::imgcodecs::DEFAULT_JPEG_QUALITY;
use crate::internal::sync::lock;

/// 单路流的运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// 打开设备时使用的采集配置
    pub capture: CaptureConfig,
    /// 采集线程两次读帧之间的间隔
    pub poll_interval: Duration,
    /// 超过这个时间没有人取帧，就释放设备
    pub idle_timeout: Duration,
    /// stop() 等待采集线程退出的最长时间
    pub stop_timeout: Duration,
    /// JPEG 质量 (0-100)
    pub jpeg_quality: u8,
    /// StreamGenerator 两次输出之间的间隔
    pub pacing_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::standard(),
            poll_interval: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(2),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            pacing_interval: Duration::from_millis(100),
        }
    }
}

/// 采集线程与读者共享的状态：最新帧 + 最后访问时间，同一把锁保护
#[derive(Debug)]
struct FrameSlot {
    frame: Option<Frame>,
    last_access: Instant,
}

impl FrameSlot {
    /// 时间戳只前进不后退
    fn touch(&mut self, now: Instant) {
        if now > self.last_access {
            self.last_access = now;
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    frames_captured: AtomicU64,
    read_failures: AtomicU64,
    idle_evictions: AtomicU64,
    starts: AtomicU64,
}

#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    slot: Mutex<FrameSlot>,
    counters: Counters,
}

/// 后台采集线程的所有权
#[derive(Debug)]
struct Worker {
    handle: JoinHandle<()>,
    // 发送或 Drop 都能唤醒正在等待下一轮的采集线程
    stop_tx: Sender<()>,
    exited_rx: Receiver<()>,
}

impl Worker {
    /// 请求退出并等待，最多 `timeout`。超时则把 Worker 原样还回去
    fn shutdown(self, timeout: Duration) -> std::result::Result<(), Self> {
        let _ = self.stop_tx.try_send(());

        match self.exited_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                // 线程已经释放了设备，join 只是回收线程本身
                let _ = self.handle.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }
}

/// 单个摄像头的流生命周期管理
///
/// 状态：Idle (未打开) -> Running (持有设备，采集线程运行中) -> Stopped (设备已释放)。
/// Stopped 之后可以再次 `start()`，会重新打开设备。
pub struct CameraStream {
    name: String,
    device_index: u32,
    config: StreamConfig,
    driver: Arc<dyn Driver>,
    shared: Arc<Shared>,
    // 同时串行化 start/stop
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for CameraStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraStream")
            .field("name", &self.name)
            .field("device_index", &self.device_index)
            .field("running", &self.is_running())
            .finish()
    }
}

impl CameraStream {
    /// 创建流 (Idle 状态，不打开设备)
    pub fn new(
        name: impl Into<String>,
        device_index: u32,
        driver: Arc<dyn Driver>,
        config: StreamConfig,
    ) -> Self {
        Self {
            name: name.into(),
            device_index,
            config,
            driver,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                slot: Mutex::new(FrameSlot {
                    frame: None,
                    last_access: Instant::now(),
                }),
                counters: Counters::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// 打开设备并启动采集线程。已经在运行时什么都不做。
    ///
    /// 不等待第一帧，立即返回。
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if self.is_running() {
            return Ok(());
        }

        // 1. 回收上一次的采集线程，确保旧句柄已经释放
        if let Some(previous) = worker.take() {
            if let Err(previous) = previous.shutdown(self.config.stop_timeout) {
                *worker = Some(previous);
                tracing::warn!(
                    "Camera {} ({}): previous capture thread still holds the device",
                    self.name,
                    self.device_index
                );
                return Err(CameraError::DeviceBusy);
            }
        }

        // 2. 打开设备 (失败直接返回给调用方，不自动重试)
        let device = self
            .driver
            .open(self.device_index, &self.config.capture)
            .inspect_err(|e| {
                tracing::warn!("Camera {} ({}) failed to open: {}", self.name, self.device_index, e)
            })?;

        // 3. 重置空闲计时
        lock(&self.shared.slot).touch(Instant::now());
        self.shared.running.store(true, Ordering::Release);

        // 4. 启动采集线程
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (exited_tx, exited_rx) = bounded::<()>(1);
        let shared = self.shared.clone();
        let ctx = CaptureContext {
            name: self.name.clone(),
            idle_timeout: self.config.idle_timeout,
            poll_interval: self.config.poll_interval,
        };

        let spawned = std::thread::Builder::new()
            .name(format!("camstream-{}", self.name))
            .spawn(move || {
                capture_loop(&ctx, &shared, device, &stop_rx);
                let _ = exited_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // 闭包 (连同设备) 已被丢弃，设备随之释放
                self.shared.running.store(false, Ordering::Release);
                return Err(CameraError::Io(e));
            }
        };

        self.shared.counters.starts.fetch_add(1, Ordering::Relaxed);
        *worker = Some(Worker {
            handle,
            stop_tx,
            exited_rx,
        });

        tracing::info!(
            "Camera {} ({}) started, idle timeout {:?}",
            self.name,
            self.device_index,
            self.config.idle_timeout
        );
        Ok(())
    }

    /// 取最新帧，同时刷新空闲计时。
    ///
    /// 从不等待新帧：第一帧到达之前返回 None。
    pub fn get_frame(&self) -> Option<Frame> {
        let mut slot = lock(&self.shared.slot);
        slot.touch(Instant::now());
        slot.frame.clone()
    }

    /// 停止采集并释放设备。可重复调用。
    ///
    /// 等待采集线程退出，最多 `stop_timeout`；超时后线程仍会在当前读帧返回后自行退出。
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);

        let mut worker = lock(&self.worker);
        if let Some(w) = worker.take() {
            if let Err(w) = w.shutdown(self.config.stop_timeout) {
                tracing::warn!(
                    "Camera {} ({}): capture thread did not exit within {:?}",
                    self.name,
                    self.device_index,
                    self.config.stop_timeout
                );
                *worker = Some(w);
                return;
            }
            tracing::info!("Camera {} ({}) stopped", self.name, self.device_index);
        }
    }

    /// 只发出停止请求，不等待。批量关闭时先对所有流调用它，再逐个 `stop()`
    pub(crate) fn request_stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(w) = lock(&self.worker).as_ref() {
            let _ = w.stop_tx.try_send(());
        }
    }

    /// 距离上一次取帧 (或启动) 过去了多久
    pub fn idle_for(&self) -> Duration {
        lock(&self.shared.slot).last_access.elapsed()
    }

    pub fn telemetry(&self) -> StreamTelemetry {
        let c = &self.shared.counters;
        StreamTelemetry {
            frames_captured: c.frames_captured.load(Ordering::Relaxed),
            read_failures: c.read_failures.load(Ordering::Relaxed),
            idle_evictions: c.idle_evictions.load(Ordering::Relaxed),
            starts: c.starts.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CameraStream {
    // 不等待：采集线程会在下一轮看到停止信号后自行释放设备
    fn drop(&mut self) {
        self.request_stop();
    }
}

struct CaptureContext {
    name: String,
    idle_timeout: Duration,
    poll_interval: Duration,
}

/// 采集线程主循环
///
/// 设备在这个函数返回时被 Drop，也就是说设备的释放总是发生在采集线程里。
fn capture_loop(
    ctx: &CaptureContext,
    shared: &Shared,
    mut device: Box<dyn CaptureDevice>,
    stop_rx: &Receiver<()>,
) {
    tracing::debug!("Capture thread for {} ({}) running", ctx.name, device.info().id);

    while shared.running.load(Ordering::Acquire) {
        // 1. 空闲检查：没人看就释放设备 (不是错误)
        let idle = lock(&shared.slot).last_access.elapsed();
        if idle > ctx.idle_timeout {
            tracing::info!("Camera {} timed out after {:?} without viewers", ctx.name, idle);
            shared.running.store(false, Ordering::Release);
            shared.counters.idle_evictions.fetch_add(1, Ordering::Relaxed);
            break;
        }

        // 2. 读一帧；失败就保留旧帧，下一轮再试
        match device.read() {
            Ok(Some(frame)) => {
                lock(&shared.slot).frame = Some(frame);
                shared.counters.frames_captured.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                shared.counters.read_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::debug!("Camera {} read failed: {}", ctx.name, e);
                shared.counters.read_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        // 3. 固定间隔，限制采集频率和 CPU；停止信号可以提前唤醒
        match stop_rx.recv_timeout(ctx.poll_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shared.running.store(false, Ordering::Release);
    drop(device);
}

#[cfg(test)]
mod tests {
    use super::*;
    use camstream_simulation::{SimulatedDevice, SimulatedDriver};

    fn fast_config() -> StreamConfig {
        StreamConfig {
            poll_interval: Duration::from_millis(10),
            idle_timeout: Duration::from_secs(5),
            ..StreamConfig::default()
        }
    }

    fn stream(config: StreamConfig) -> (CameraStream, SimulatedDriver) {
        let driver = SimulatedDriver::new().with_device(0, SimulatedDevice::qvga());
        let stream = CameraStream::new("camera1", 0, Arc::new(driver.clone()), config);
        (stream, driver)
    }

    fn wait_for(mut cond: impl FnMut() -> bool, limit: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < limit {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn defaults_match_the_streaming_profile() {
        let config = StreamConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.jpeg_quality, 30);
        assert_eq!(config.capture.preferred_resolution(), Some((320, 240)));
        assert_eq!(config.capture.target_fps(), Some(15));
    }

    #[test]
    fn new_stream_is_idle() {
        let (stream, driver) = stream(fast_config());
        assert!(!stream.is_running());
        assert!(stream.get_frame().is_none());
        assert_eq!(driver.opened(0), 0);
    }

    #[test]
    fn start_is_idempotent() {
        let (stream, driver) = stream(fast_config());
        stream.start().expect("start");
        stream.start().expect("second start");
        assert!(stream.is_running());
        assert_eq!(driver.opened(0), 1);
        stream.stop();
    }

    #[test]
    fn frames_arrive_after_start() {
        let (stream, _driver) = stream(fast_config());
        stream.start().expect("start");

        assert!(wait_for(|| stream.get_frame().is_some(), Duration::from_secs(2)));
        let frame = stream.get_frame().expect("frame");
        assert_eq!((frame.width, frame.height), (320, 240));
        stream.stop();
    }

    #[test]
    fn stop_releases_the_device_and_is_idempotent() {
        let (stream, driver) = stream(fast_config());
        stream.start().expect("start");
        stream.stop();
        stream.stop();

        assert!(!stream.is_running());
        assert!(!driver.is_open(0));
        assert_eq!(driver.released(0), 1);
    }

    #[test]
    fn open_failure_leaves_stream_stopped() {
        let (stream, driver) = stream(fast_config());
        driver.set_open_failure(0, true);

        assert!(matches!(stream.start(), Err(CameraError::Open { index: 0, .. })));
        assert!(!stream.is_running());
        assert_eq!(stream.telemetry().starts, 0);
    }

    #[test]
    fn read_failures_keep_previous_frame() {
        let (stream, driver) = stream(fast_config());
        stream.start().expect("start");
        assert!(wait_for(|| stream.get_frame().is_some(), Duration::from_secs(2)));

        driver.set_read_failures(0, true);
        let before = stream.telemetry().read_failures;
        assert!(wait_for(
            || stream.telemetry().read_failures > before + 2,
            Duration::from_secs(2)
        ));

        assert!(stream.get_frame().is_some());
        assert!(stream.is_running());
        stream.stop();
    }

    #[test]
    fn stalled_device_still_times_out() {
        let config = StreamConfig {
            capture: CaptureConfig::standard().read_timeout(Some(Duration::from_millis(50))),
            idle_timeout: Duration::from_millis(200),
            ..fast_config()
        };
        let (stream, driver) = stream(config);
        driver.set_read_delay(0, Duration::from_secs(60));

        stream.start().expect("start");
        assert!(wait_for(|| !stream.is_running(), Duration::from_secs(2)));
        assert!(wait_for(|| !driver.is_open(0), Duration::from_secs(1)));
    }

    #[test]
    fn access_clock_never_moves_backwards() {
        let (stream, _driver) = stream(fast_config());
        let earlier = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        stream.get_frame();

        let mut slot = lock(&stream.shared.slot);
        let recorded = slot.last_access;
        slot.touch(earlier);
        assert_eq!(slot.last_access, recorded);
    }
}
