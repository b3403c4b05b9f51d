//! MJPEG (multipart/x-mixed-replace) 分块生成
//!
//! 每个 HTTP 连接一个 [`StreamGenerator`]。它是拉取式的：传输层每拉一次，
//! 才去 CameraStream 取一帧、编码、输出一个分块。连接关闭时传输层取消
//! (或直接 Drop) 生成器即可，底层 CameraStream 不受影响。

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::imgcodecs::{FrameEncoder, JpegEncoder};
use crate::videoio::CameraStream;

/// 分隔符
pub const BOUNDARY: &str = "frame";

/// HTTP 响应的 Content-Type
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// 构造一个 multipart 分块：头 + JPEG + CRLF
pub fn format_chunk(jpeg: &[u8]) -> Bytes {
    let mut chunk = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    chunk.put_slice(PART_HEADER);
    chunk.put_slice(jpeg);
    chunk.put_slice(PART_TRAILER);
    chunk.freeze()
}

/// 单个消费者的分块序列
pub struct StreamGenerator {
    camera: String,
    inner: BoxStream<'static, Bytes>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StreamGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGenerator")
            .field("camera", &self.camera)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl StreamGenerator {
    /// 使用默认 JPEG 编码器，质量和节奏取自流的配置
    pub fn new(stream: Arc<CameraStream>) -> Self {
        Self::with_encoder(stream, Arc::new(JpegEncoder))
    }

    pub fn with_encoder(stream: Arc<CameraStream>, encoder: Arc<dyn FrameEncoder>) -> Self {
        let camera = stream.name().to_string();
        let cancel = CancellationToken::new();
        let config = stream.config();

        let pump = Pump {
            quality: config.jpeg_quality,
            pacing: config.pacing_interval,
            stream,
            encoder,
            cancel: cancel.clone(),
            pace_pending: false,
            last: None,
        };

        tracing::debug!("Streaming video from {}", camera);

        let inner = stream::unfold(pump, |mut pump| async move {
            let chunk = pump.next_chunk().await?;
            Some((chunk, pump))
        })
        .boxed();

        Self {
            camera,
            inner,
            cancel,
        }
    }

    /// 取消令牌：传输层在连接关闭时调用 `cancel()`
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 拉取下一个分块；None 表示序列结束
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.inner.next().await
    }
}

impl futures_core::Stream for StreamGenerator {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for StreamGenerator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 生成器的内部状态
struct Pump {
    stream: Arc<CameraStream>,
    encoder: Arc<dyn FrameEncoder>,
    quality: u8,
    pacing: Duration,
    cancel: CancellationToken,
    // 下一步开始前是否需要先等待一个节奏间隔
    pace_pending: bool,
    // 同一帧不重复编码：(序号, 采集时刻) -> 分块
    last: Option<((u64, Instant), Bytes)>,
}

impl Pump {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        loop {
            // 1. 节奏控制：无论有没有帧、编码是否成功，每一步之间都等待固定间隔
            if std::mem::take(&mut self.pace_pending) && !self.pause().await {
                tracing::debug!("{}: consumer disconnected", self.stream.name());
                return None;
            }

            // 2. 终止条件
            if self.cancel.is_cancelled() {
                tracing::debug!("{}: consumer disconnected", self.stream.name());
                return None;
            }
            if !self.stream.is_running() {
                tracing::debug!("{}: stream stopped, ending response", self.stream.name());
                return None;
            }
            self.pace_pending = true;

            // 3. 取帧 (同时刷新空闲计时)；还没有帧就下一轮再试
            let Some(frame) = self.stream.get_frame() else {
                continue;
            };

            let key = (frame.sequence, frame.captured_at);
            if let Some((last_key, chunk)) = &self.last {
                if *last_key == key {
                    return Some(chunk.clone());
                }
            }

            // 4. 编码是 CPU 密集型的，放到阻塞线程池
            let encoder = self.encoder.clone();
            let quality = self.quality;
            let encoded = tokio::task::spawn_blocking(move || encoder.encode(&frame, quality)).await;

            match encoded {
                Ok(Ok(jpeg)) => {
                    let chunk = format_chunk(&jpeg);
                    self.last = Some((key, chunk.clone()));
                    return Some(chunk);
                }
                // 编码失败只丢弃这一帧
                Ok(Err(e)) => {
                    tracing::debug!("{}: dropping frame {}: {}", self.stream.name(), key.0, e);
                }
                Err(e) => {
                    tracing::warn!("{}: encoder task failed: {}", self.stream.name(), e);
                }
            }
        }
    }

    /// 等待一个节奏间隔；被取消时返回 false
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.pacing) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::videoio::StreamConfig;
    use camstream_core::error::{CameraError, Result};
    use camstream_core::frame::Frame;
    use camstream_simulation::{SimulatedDevice, SimulatedDriver};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn running_stream(pacing: Duration) -> (Arc<CameraStream>, SimulatedDriver) {
        let driver = SimulatedDriver::new().with_device(0, SimulatedDevice::qvga());
        let config = StreamConfig {
            poll_interval: Duration::from_millis(10),
            pacing_interval: pacing,
            ..StreamConfig::default()
        };
        let stream = Arc::new(CameraStream::new("camera1", 0, Arc::new(driver.clone()), config));
        stream.start().expect("start");
        (stream, driver)
    }

    /// 奇数序号的帧编码失败
    struct FlakyEncoder {
        calls: AtomicUsize,
    }

    impl FrameEncoder for FlakyEncoder {
        fn encode(&self, frame: &Frame, _quality: u8) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if frame.sequence % 2 == 1 {
                return Err(CameraError::Encode("flaky".into()));
            }
            Ok(Bytes::from(format!("jpeg-{}", frame.sequence)))
        }
    }

    #[test]
    fn chunk_layout() {
        let chunk = format_chunk(b"\xFF\xD8abc\xFF\xD9");
        assert_eq!(
            &chunk[..],
            b"--frame\r\nContent-type: image/jpeg\r\n\r\n\xFF\xD8abc\xFF\xD9\r\n"
        );
        assert_eq!(MULTIPART_CONTENT_TYPE, format!("multipart/x-mixed-replace; boundary={BOUNDARY}"));
    }

    #[tokio::test]
    async fn emits_jpeg_chunks() {
        let (stream, _driver) = running_stream(Duration::from_millis(10));
        let mut generator = StreamGenerator::new(stream.clone());

        let chunk = tokio::time::timeout(Duration::from_secs(5), generator.next_chunk())
            .await
            .expect("chunk in time")
            .expect("chunk");
        assert!(chunk.starts_with(PART_HEADER));
        assert!(chunk.ends_with(b"\xFF\xD9\r\n"));
        stream.stop();
    }

    #[tokio::test]
    async fn failed_frames_are_never_emitted() {
        let (stream, _driver) = running_stream(Duration::from_millis(5));
        let encoder = Arc::new(FlakyEncoder {
            calls: AtomicUsize::new(0),
        });
        let mut generator = StreamGenerator::with_encoder(stream.clone(), encoder.clone());

        for _ in 0..5 {
            let chunk = tokio::time::timeout(Duration::from_secs(5), generator.next_chunk())
                .await
                .expect("chunk in time")
                .expect("chunk");
            let body = &chunk[PART_HEADER.len()..chunk.len() - PART_TRAILER.len()];
            let seq: u64 = std::str::from_utf8(body)
                .expect("utf8")
                .trim_start_matches("jpeg-")
                .parse()
                .expect("sequence");
            assert_eq!(seq % 2, 0, "emitted a frame that failed to encode");
        }
        assert!(encoder.calls.load(Ordering::SeqCst) >= 5);
        stream.stop();
    }

    #[tokio::test]
    async fn ends_when_stream_stops() {
        let (stream, _driver) = running_stream(Duration::from_millis(10));
        let mut generator = StreamGenerator::new(stream.clone());
        stream.stop();

        let next = tokio::time::timeout(Duration::from_secs(1), generator.next_chunk())
            .await
            .expect("ends promptly");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn cancellation_does_not_stop_the_camera() {
        let (stream, driver) = running_stream(Duration::from_millis(10));
        let mut generator = StreamGenerator::new(stream.clone());
        generator.cancel();

        assert!(generator.next_chunk().await.is_none());
        assert!(stream.is_running());
        assert!(driver.is_open(0));
        stream.stop();
    }
}
