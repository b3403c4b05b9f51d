use std::io;
use std::sync::Arc;

use bytes::Bytes;
use v4l::buffer::Type;

// 同时引入 Stream (用于 start/stop) 和 CaptureStream (用于 next)
use v4l::io::traits::{CaptureStream, Stream as V4lStream};

use camstream_core::builder::CaptureConfig;
use camstream_core::error::{CameraError, Result};
use camstream_core::frame::Frame;
use camstream_core::pixel_format::PixelFormat;
use camstream_core::traits::{CaptureDevice, DeviceInfo};

/// 独占的 V4L2 采集句柄，Drop 时 STREAMOFF 并关闭 fd
pub struct V4l2Capture {
    inner: v4l::io::mmap::Stream<'static>,
    info: DeviceInfo,
    width: u32,
    height: u32,
    format: PixelFormat,
    // 保证 fd 的生命周期覆盖 mmap 区域
    _dev: Arc<v4l::Device>,
}

// mmap 区域只在持有 &mut self 的线程里访问
unsafe impl Send for V4l2Capture {}

impl V4l2Capture {
    pub fn new(
        dev: Arc<v4l::Device>,
        info: DeviceInfo,
        fmt: &v4l::Format,
        config: &CaptureConfig,
    ) -> io::Result<Self> {
        let mut stream =
            v4l::io::mmap::Stream::with_buffers(&dev, Type::VideoCapture, config.buffer_count as u32)?;

        // 读帧期限：防止设备卡死时采集线程永远阻塞在 DQBUF 上
        if let Some(timeout) = config.read_timeout {
            stream.set_timeout(timeout);
        }

        V4lStream::start(&mut stream)?;

        Ok(Self {
            inner: stream,
            info,
            width: fmt.width,
            height: fmt.height,
            format: crate::pixel_map::from_v4l_fourcc(fmt.fourcc),
            _dev: dev,
        })
    }
}

impl CaptureDevice for V4l2Capture {
    fn read(&mut self) -> Result<Option<Frame>> {
        let (buf, meta) = match self.inner.next() {
            Ok(next) => next,
            // 超时不是错误，只是这一轮没有帧
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                return Err(CameraError::Disconnected(self.info.id.clone()))
            }
            Err(e) => return Err(CameraError::Io(e)),
        };

        // 部分驱动不填 bytesused，此时使用整个 buffer
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        if used == 0 {
            return Ok(None);
        }

        // 拷贝出 mmap 区域：buffer 会在下一次 DQBUF 时被驱动复用
        Ok(Some(Frame::new(
            Bytes::copy_from_slice(&buf[..used]),
            self.width,
            self.height,
            self.format,
            meta.sequence as u64,
        )))
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        if let Err(e) = V4lStream::stop(&mut self.inner) {
            tracing::debug!(target: "camstream::v4l2", "{}: STREAMOFF failed: {}", self.info.id, e);
        }
        tracing::info!(target: "camstream::v4l2", "Camera released: {}", self.info.id);
    }
}
