use bytes::Bytes;
use camstream_core::error::{CameraError, Result};
use camstream_core::frame::Frame;
use camstream_core::pixel_format::FourCC;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::{GrayImage, RgbImage};

/// 默认 JPEG 质量 (0-100)。预览画面，30 已经足够，且带宽很小
pub const DEFAULT_JPEG_QUALITY: u8 = 30;

/// 帧编码器：Raw Frame -> 压缩图像字节
///
/// 失败时返回 `Err`，绝不返回 "成功但为空" 的结果。
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame, quality: u8) -> Result<Bytes>;
}

/// 基于 image crate 的 JPEG 编码器
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegEncoder;

impl FrameEncoder for JpegEncoder {
    fn encode(&self, frame: &Frame, quality: u8) -> Result<Bytes> {
        imencode_jpeg(frame, quality)
    }
}

/// 将一帧编码为 JPEG
///
/// 支持 YUYV、RGB24、BGR24、GREY 以及 MJPEG (解码后按指定质量重新编码)。
pub fn imencode_jpeg(frame: &Frame, quality: u8) -> Result<Bytes> {
    if frame.is_empty() {
        return Err(CameraError::Encode("empty frame".into()));
    }

    let (w, h) = (frame.width, frame.height);
    let quality = quality.clamp(1, 100);

    // 1. 先统一转换为 image crate 能直接编码的缓冲区
    let mut jpeg_buffer = Vec::new();
    let result = {
        let mut encoder = ImageJpegEncoder::new_with_quality(&mut jpeg_buffer, quality);
        match frame.format.fourcc() {
            FourCC::GREY => {
                let img = GrayImage::from_raw(w, h, packed(frame)?.to_vec())
                    .ok_or_else(|| short_buffer(frame))?;
                encoder.encode_image(&img)
            }
            FourCC::MJPEG => {
                let decoded =
                    image::load_from_memory_with_format(&frame.data, image::ImageFormat::Jpeg)
                        .map_err(|e| CameraError::Encode(format!("corrupt MJPEG frame: {}", e)))?;
                encoder.encode_image(&decoded.to_rgb8())
            }
            _ => {
                let img = to_rgb(frame)?;
                encoder.encode_image(&img)
            }
        }
    };

    // 2. RGB/Gray -> JPEG
    result.map_err(|e| CameraError::Encode(e.to_string()))?;

    if jpeg_buffer.is_empty() {
        return Err(CameraError::Encode("encoder produced no data".into()));
    }

    Ok(Bytes::from(jpeg_buffer))
}

/// 未压缩格式转 RGB8
fn to_rgb(frame: &Frame) -> Result<RgbImage> {
    let src = packed(frame)?;
    let (w, h) = (frame.width, frame.height);

    let rgb = match frame.format.fourcc() {
        FourCC::RGB3 => src.to_vec(),
        FourCC::BGR3 => src
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
        FourCC::YUYV => {
            let mut rgb_buffer = vec![0u8; w as usize * h as usize * 3];
            yuyv_to_rgb8(src, &mut rgb_buffer);
            rgb_buffer
        }
        _ => return Err(CameraError::FormatNotSupported),
    };

    RgbImage::from_raw(w, h, rgb).ok_or_else(|| short_buffer(frame))
}

/// 取出 Packed 数据中实际需要的部分，长度不足时报错
fn packed(frame: &Frame) -> Result<&[u8]> {
    let need = frame
        .format
        .frame_len(frame.width, frame.height)
        .ok_or(CameraError::FormatNotSupported)?;

    frame.data.get(..need).ok_or_else(|| short_buffer(frame))
}

fn short_buffer(frame: &Frame) -> CameraError {
    CameraError::Encode(format!(
        "{} bytes is too short for {}x{} {}",
        frame.data.len(),
        frame.width,
        frame.height,
        frame.format
    ))
}

// YUYV -> RGB8 (R,G,B, R,G,B...)，BT.601 整数近似
fn yuyv_to_rgb8(src: &[u8], dest: &mut [u8]) {
    for (yuyv, rgb) in src.chunks_exact(4).zip(dest.chunks_exact_mut(6)) {
        let y0 = yuyv[0] as i32;
        let u = yuyv[1] as i32 - 128;
        let y1 = yuyv[2] as i32;
        let v = yuyv[3] as i32 - 128;

        let c0 = y0 - 16;
        let c1 = y1 - 16;

        // Pixel 1
        rgb[0] = clip((298 * c0 + 409 * v + 128) >> 8);
        rgb[1] = clip((298 * c0 - 100 * u - 208 * v + 128) >> 8);
        rgb[2] = clip((298 * c0 + 516 * u + 128) >> 8);

        // Pixel 2
        rgb[3] = clip((298 * c1 + 409 * v + 128) >> 8);
        rgb[4] = clip((298 * c1 - 100 * u - 208 * v + 128) >> 8);
        rgb[5] = clip((298 * c1 + 516 * u + 128) >> 8);
    }
}

#[inline]
fn clip(val: i32) -> u8 {
    val.clamp(0, 255) as u8
}
