use crate::pixel_format::PixelFormat;
use bytes::Bytes;
use std::time::Instant;

/// 核心帧结构体
///
/// 数据放在 `Bytes` 里：一旦发布就不可变，克隆只增加引用计数。
/// 采集线程每次替换的是整帧，读者拿到的要么是旧帧，要么是新帧，不会读到写了一半的缓冲区。
#[derive(Debug, Clone)]
pub struct Frame {
    /// 原始图像数据 (Packed 布局，或 MJPEG 压缩数据)
    pub data: Bytes,

    /// 图像宽度 (Pixels)
    pub width: u32,

    /// 图像高度 (Pixels)
    pub height: u32,

    /// 像素格式
    pub format: PixelFormat,

    /// 设备侧帧序号，同一设备句柄内单调递增
    pub sequence: u64,

    /// 帧到达用户态的时刻
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }

    /// 每行字节数 (仅对未压缩格式有意义)
    pub fn stride(&self) -> Option<usize> {
        self.format
            .bits_per_pixel()
            .map(|bpp| self.width as usize * bpp as usize / 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_format::FourCC;

    #[test]
    fn clones_share_the_buffer() {
        let frame = Frame::new(vec![7u8; 12], 2, 2, FourCC::RGB3.into(), 1);
        let copy = frame.clone();
        assert_eq!(copy.data.as_ptr(), frame.data.as_ptr());
        assert_eq!(copy.stride(), Some(6));
    }

    #[test]
    fn zero_sized_frames_are_empty() {
        assert!(Frame::new(Vec::new(), 2, 2, FourCC::GREY.into(), 0).is_empty());
        assert!(Frame::new(vec![1u8; 4], 0, 2, FourCC::GREY.into(), 0).is_empty());
        assert!(!Frame::new(vec![1u8; 4], 2, 2, FourCC::GREY.into(), 0).is_empty());
    }
}
