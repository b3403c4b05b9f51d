use camstream_core::pixel_format::{FourCC, PixelFormat};
use v4l::format::fourcc::FourCC as V4lFourCC;

/// 将 v4l crate 的 FourCC 转换为 camstream-core 的 PixelFormat
pub fn from_v4l_fourcc(cc: V4lFourCC) -> PixelFormat {
    // 提取 u32 原始值
    let code: u32 = cc.into();
    let format = PixelFormat::from(code);

    if let PixelFormat::Unknown(_) = format {
        tracing::debug!(target: "camstream::v4l2", "Unsupported V4L2 pixel format: {}", FourCC(code));
    }

    format
}

/// 将 camstream-core 的 PixelFormat 转换为 v4l 的 FourCC
/// 用于请求设备设置格式
pub fn to_v4l_fourcc(fmt: PixelFormat) -> Option<V4lFourCC> {
    match fmt {
        PixelFormat::Known(cc) => Some(V4lFourCC::new(&cc.0.to_le_bytes())),
        PixelFormat::Unknown(_) => None, // 无法主动请求未知的格式
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_formats_round_trip() {
        let v4l_cc = to_v4l_fourcc(FourCC::MJPEG.into()).expect("known format");
        assert_eq!(v4l_cc.repr, *b"MJPG");
        assert_eq!(from_v4l_fourcc(v4l_cc), PixelFormat::Known(FourCC::MJPEG));
    }

    #[test]
    fn unknown_formats_cannot_be_requested() {
        assert!(to_v4l_fourcc(PixelFormat::Unknown(0x3436_3248)).is_none());
        assert_eq!(
            from_v4l_fourcc(V4lFourCC::new(b"H264")),
            PixelFormat::Unknown(u32::from_le_bytes(*b"H264"))
        );
    }
}
