use std::fmt::{self, Display};

/// 四字符代码 (Four Character Code)，视频工业标准
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FourCC(pub u32);

impl FourCC {
    /// 从 ASCII 字符创建 FourCC
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self((a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24))
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();

        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// USB 摄像头上常见的像素格式
impl FourCC {
    /// YUYV 4:2:2 - UVC 摄像头最常用的未压缩格式
    pub const YUYV: Self = Self::new(b'Y', b'U', b'Y', b'V');

    /// RGB24 (Little Endian: B-G-R)
    pub const BGR3: Self = Self::new(b'B', b'G', b'R', b'3');
    /// RGB24 (Big Endian: R-G-B)
    pub const RGB3: Self = Self::new(b'R', b'G', b'B', b'3');

    /// 8-bit 灰度
    pub const GREY: Self = Self::new(b'G', b'R', b'E', b'Y');

    /// Motion-JPEG - 用于节省 USB 带宽
    pub const MJPEG: Self = Self::new(b'M', b'J', b'P', b'G');
}

/// 像素格式的高级枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 已知的标准格式
    Known(FourCC),
    /// 驱动返回了库不认识的私有格式
    Unknown(u32),
}

impl PixelFormat {
    /// 判断是否为压缩格式
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Known(FourCC::MJPEG))
    }

    /// 每像素比特数 (Bits Per Pixel)；压缩或未知格式返回 None
    pub fn bits_per_pixel(&self) -> Option<u32> {
        match self {
            Self::Known(cc) => match *cc {
                FourCC::YUYV => Some(16),
                FourCC::BGR3 | FourCC::RGB3 => Some(24),
                FourCC::GREY => Some(8),
                _ => None,
            },
            Self::Unknown(_) => None,
        }
    }

    /// 一帧 Packed 数据应有的最小字节数
    pub fn frame_len(&self, width: u32, height: u32) -> Option<usize> {
        self.bits_per_pixel()
            .map(|bpp| width as usize * height as usize * bpp as usize / 8)
    }

    pub fn fourcc(&self) -> FourCC {
        match self {
            Self::Known(cc) => *cc,
            Self::Unknown(val) => FourCC(*val),
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(cc) => write!(f, "{}", cc),
            Self::Unknown(val) => write!(f, "unknown(0x{:08x})", val),
        }
    }
}

impl From<u32> for PixelFormat {
    fn from(val: u32) -> Self {
        match FourCC(val) {
            cc @ (FourCC::YUYV | FourCC::BGR3 | FourCC::RGB3 | FourCC::GREY | FourCC::MJPEG) => {
                Self::Known(cc)
            }
            _ => Self::Unknown(val),
        }
    }
}

impl From<FourCC> for PixelFormat {
    fn from(cc: FourCC) -> Self {
        Self::from(cc.0)
    }
}

impl PartialEq<PixelFormat> for FourCC {
    fn eq(&self, other: &PixelFormat) -> bool {
        match other {
            PixelFormat::Known(cc) => self == cc,
            PixelFormat::Unknown(val) => self.0 == *val,
        }
    }
}

// 反向比较也加上
impl PartialEq<FourCC> for PixelFormat {
    fn eq(&self, other: &FourCC) -> bool {
        other == self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_prints_ascii() {
        assert_eq!(FourCC::YUYV.to_string(), "YUYV");
        assert_eq!(FourCC::MJPEG.to_string(), "MJPG");
    }

    #[test]
    fn unrecognised_codes_stay_unknown() {
        let h264 = FourCC::new(b'H', b'2', b'6', b'4');
        assert_eq!(PixelFormat::from(h264), PixelFormat::Unknown(h264.0));
        assert_eq!(PixelFormat::from(FourCC::GREY), PixelFormat::Known(FourCC::GREY));
    }

    #[test]
    fn packed_frame_lengths() {
        let yuyv = PixelFormat::from(FourCC::YUYV);
        assert_eq!(yuyv.frame_len(320, 240), Some(320 * 240 * 2));
        assert_eq!(PixelFormat::from(FourCC::RGB3).frame_len(2, 2), Some(12));
        assert_eq!(PixelFormat::from(FourCC::MJPEG).frame_len(320, 240), None);
        assert!(PixelFormat::from(FourCC::MJPEG).is_compressed());
    }
}
