use crate::pixel_format::{FourCC, PixelFormat};
use std::time::Duration;

/// 默认采集参数：320x240 @ 15fps，足够局域网预览且 CPU 占用低
pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 240;
pub const DEFAULT_FPS: u32 = 15;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// 打开设备时的采集配置 (格式协商的输入)
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub resolution_req: Vec<(u32, u32, Priority)>,
    pub fps_req: Option<(u32, Priority)>,
    pub format_req: Vec<(PixelFormat, Priority)>,
    pub buffer_count: usize, // Ring Buffer 大小，默认 4
    /// 单次读帧的最长等待时间。None 表示无限等待 (不推荐)
    pub read_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low = 0,
    Medium = 50,
    High = 100,
    Required = 255, // 必须满足，否则报错
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl CaptureConfig {
    /// 空配置：不带任何要求，由后端自行挑选
    pub fn new() -> Self {
        Self {
            resolution_req: vec![],
            fps_req: None,
            format_req: vec![],
            buffer_count: 4,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }

    /// 流媒体服务使用的标准配置
    pub fn standard() -> Self {
        Self::new()
            .resolution(DEFAULT_WIDTH, DEFAULT_HEIGHT, Priority::High)
            .fps(DEFAULT_FPS, Priority::Medium)
            .format(FourCC::YUYV, Priority::High)
            .format(FourCC::MJPEG, Priority::Medium)
    }

    /// 添加分辨率要求
    pub fn resolution(mut self, w: u32, h: u32, p: Priority) -> Self {
        self.resolution_req.push((w, h, p));
        self
    }

    /// 设置帧率要求 (覆盖之前的设置)
    pub fn fps(mut self, fps: u32, p: Priority) -> Self {
        self.fps_req = Some((fps, p));
        self
    }

    /// 添加像素格式要求
    /// 支持传入 PixelFormat 或 FourCC (会自动转换)
    pub fn format<T: Into<PixelFormat>>(mut self, fmt: T, p: Priority) -> Self {
        self.format_req.push((fmt.into(), p));
        self
    }

    /// 设置缓冲区数量
    pub fn buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count.max(1);
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// 优先级最高的分辨率请求；同优先级取先添加的
    pub fn preferred_resolution(&self) -> Option<(u32, u32)> {
        self.resolution_req
            .iter()
            .enumerate()
            .max_by_key(|(i, (_, _, p))| (*p, std::cmp::Reverse(*i)))
            .map(|(_, (w, h, _))| (*w, *h))
    }

    pub fn target_fps(&self) -> Option<u32> {
        self.fps_req.map(|(fps, _)| fps)
    }

    /// 计算某个 (分辨率, 格式) 组合的得分，供后端做格式协商
    pub fn score(&self, w: u32, h: u32, fmt: PixelFormat) -> i32 {
        let mut score = 0;

        // 1. 匹配分辨率
        for (req_w, req_h, prio) in &self.resolution_req {
            if w == *req_w && h == *req_h {
                score += *prio as i32 * 10;
            }
        }

        // 2. 匹配格式
        for (req_fmt, prio) in &self.format_req {
            if fmt == *req_fmt {
                score += *prio as i32 * 10;
            }
        }

        // 3. 分辨率越接近请求越好 (作为 Tie-breaker)
        if let Some((req_w, req_h)) = self.preferred_resolution() {
            let dist = (w as i64 - req_w as i64).abs() + (h as i64 - req_h as i64).abs();
            score -= (dist / 100) as i32;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_requests_qvga_at_15fps() {
        let config = CaptureConfig::standard();
        assert_eq!(config.preferred_resolution(), Some((320, 240)));
        assert_eq!(config.target_fps(), Some(15));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn higher_priority_resolution_wins() {
        let config = CaptureConfig::new()
            .resolution(640, 480, Priority::Low)
            .resolution(1280, 720, Priority::Required);
        assert_eq!(config.preferred_resolution(), Some((1280, 720)));
    }

    #[test]
    fn scoring_prefers_requested_format_and_size() {
        let config = CaptureConfig::standard();
        let yuyv = PixelFormat::from(FourCC::YUYV);
        let mjpeg = PixelFormat::from(FourCC::MJPEG);

        assert!(config.score(320, 240, yuyv) > config.score(320, 240, mjpeg));
        assert!(config.score(320, 240, mjpeg) > config.score(1920, 1080, mjpeg));
    }

    #[test]
    fn buffer_count_never_zero() {
        assert_eq!(CaptureConfig::new().buffer_count(0).buffer_count, 1);
    }
}
