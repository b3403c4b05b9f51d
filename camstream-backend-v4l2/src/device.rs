use std::io;
use std::sync::Arc;
use v4l::capability::Flags;
use v4l::video::capture::Parameters;
use v4l::video::Capture;

use camstream_core::builder::CaptureConfig;
use camstream_core::error::{CameraError, Result};
use camstream_core::pixel_format::PixelFormat;
use camstream_core::traits::{CaptureDevice, DeviceInfo};

use crate::pixel_map;
use crate::stream::V4l2Capture;

/// 枚举系统中的摄像头设备
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();

    // 遍历 /dev/video* 节点
    for node in v4l::context::enum_devices() {
        let path = node.path().to_string_lossy().to_string();
        if let Ok(dev) = v4l::Device::with_path(&path) {
            if let Some(info) = describe(&dev, node.index() as u32, path, node.name()) {
                devices.push(info);
            }
        }
    }

    devices.sort_by_key(|dev| dev.index);
    Ok(devices)
}

/// 只查询能力，不申请 Buffer，不影响其他进程正在进行的采集
pub fn probe(index: u32) -> Result<DeviceInfo> {
    let dev = v4l::Device::new(index as usize).map_err(|e| map_open_error(index, e))?;
    describe(&dev, index, device_path(index), None).ok_or(CameraError::DeviceNotFound(index))
}

/// 打开设备并初始化采集
pub fn open(index: u32, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
    // 1. 打开设备句柄
    let dev = v4l::Device::new(index as usize).map_err(|e| map_open_error(index, e))?;
    let info = describe(&dev, index, device_path(index), None)
        .ok_or(CameraError::DeviceNotFound(index))?;

    // 2. 格式协商 (Format Negotiation)
    let negotiated = negotiate_format(&dev, config)?;

    // 3. 应用格式设置 (ioctl: VIDIOC_S_FMT)
    let mut fmt = dev.format().map_err(|e| map_open_error(index, e))?;
    fmt.width = negotiated.width;
    fmt.height = negotiated.height;
    fmt.fourcc =
        pixel_map::to_v4l_fourcc(negotiated.format).ok_or(CameraError::FormatNotSupported)?;
    let applied_fmt = dev.set_format(&fmt).map_err(|e| map_open_error(index, e))?;

    // 4. 帧率 (ioctl: VIDIOC_S_PARM)，很多 UVC 设备会忽略，失败不致命
    if let Some(fps) = config.target_fps() {
        if let Err(e) = dev.set_params(&Parameters::with_fps(fps)) {
            tracing::debug!(target: "camstream::v4l2", "{}: fps {} rejected: {}", info.id, fps, e);
        }
    }

    tracing::info!(
        target: "camstream::v4l2",
        "Camera opened: {} {}x{} @ {}",
        info.id,
        applied_fmt.width,
        applied_fmt.height,
        applied_fmt.fourcc
    );

    // 5. 初始化流 (申请 Buffer, mmap, STREAMON)
    let capture = V4l2Capture::new(Arc::new(dev), info, &applied_fmt, config)
        .map_err(|e| map_open_error(index, e))?;

    Ok(Box::new(capture))
}

fn device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// 查询能力；不是 Video Capture 设备 (Metadata/Output 节点) 时返回 None
fn describe(dev: &v4l::Device, index: u32, path: String, name: Option<String>) -> Option<DeviceInfo> {
    let caps = dev.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return None;
    }

    Some(DeviceInfo {
        index,
        name: name.unwrap_or_else(|| caps.card.clone()),
        id: path,
        backend: "V4L2".to_string(),
        bus_info: Some(caps.bus),
    })
}

/// EBUSY 单独映射为 DeviceBusy，其余统一视为打开失败
pub(crate) fn map_open_error(index: u32, err: io::Error) -> CameraError {
    match err.raw_os_error() {
        Some(libc::EBUSY) => CameraError::DeviceBusy,
        Some(libc::ENOENT) | Some(libc::ENODEV) => CameraError::Open {
            index,
            reason: format!("{} not found", device_path(index)),
        },
        _ => CameraError::Open {
            index,
            reason: err.to_string(),
        },
    }
}

/// 格式协商结果
#[derive(Debug)]
struct NegotiatedFormat {
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// 遍历硬件支持的所有格式，计算得分，返回最佳配置
fn negotiate_format(dev: &v4l::Device, config: &CaptureConfig) -> Result<NegotiatedFormat> {
    let mut best_score = i32::MIN;
    let mut best_fmt = None;

    let supported_formats = dev.enum_formats().map_err(CameraError::Io)?;

    for v4l_fmt in supported_formats {
        let core_fmt = pixel_map::from_v4l_fourcc(v4l_fmt.fourcc);
        // 编码器处理不了的格式直接跳过
        if !core_fmt.is_compressed() && core_fmt.bits_per_pixel().is_none() {
            continue;
        }

        let resolutions = dev.enum_framesizes(v4l_fmt.fourcc).unwrap_or_default();

        for res in resolutions {
            // 这里只处理 Discrete 分辨率，Stepwise 取其离散化结果
            for size in res.size.to_discrete() {
                let score = config.score(size.width, size.height, core_fmt);
                if score > best_score {
                    best_score = score;
                    best_fmt = Some(NegotiatedFormat {
                        width: size.width,
                        height: size.height,
                        format: core_fmt,
                    });
                }
            }
        }
    }

    best_fmt.ok_or(CameraError::FormatNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_devices_map_to_device_busy() {
        let err = map_open_error(0, io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(err, CameraError::DeviceBusy));
    }

    #[test]
    fn missing_nodes_name_the_path() {
        let err = map_open_error(4, io::Error::from_raw_os_error(libc::ENOENT));
        match err {
            CameraError::Open { index, reason } => {
                assert_eq!(index, 4);
                assert!(reason.contains("/dev/video4"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
