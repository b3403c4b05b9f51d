use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use camstream_core::error::{CameraError, Result};
use camstream_core::traits::Driver;

/// 后端枚举，用于选择驱动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    V4L2,
    Simulation,
}

impl FromStr for BackendType {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "v4l2" => Ok(Self::V4L2),
            "simulation" | "sim" => Ok(Self::Simulation),
            other => Err(CameraError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unknown backend: {}", other),
            ))),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4L2 => write!(f, "v4l2"),
            Self::Simulation => write!(f, "simulation"),
        }
    }
}

/// 创建驱动实例的工厂函数
///
/// `devices` 只对仿真后端有意义：为这些索引各挂一个仿真设备。
pub fn create_driver(backend: BackendType, devices: &[u32]) -> Result<Arc<dyn Driver>> {
    match backend {
        BackendType::V4L2 => v4l2_driver(),
        BackendType::Simulation => simulated_driver(devices),
    }
}

#[cfg(all(feature = "linux-v4l2", target_os = "linux"))]
fn v4l2_driver() -> Result<Arc<dyn Driver>> {
    Ok(camstream_backend_v4l2::default_driver())
}

#[cfg(not(all(feature = "linux-v4l2", target_os = "linux")))]
fn v4l2_driver() -> Result<Arc<dyn Driver>> {
    Err(unsupported(BackendType::V4L2))
}

#[cfg(feature = "simulation")]
fn simulated_driver(devices: &[u32]) -> Result<Arc<dyn Driver>> {
    use camstream_simulation::{SimulatedDevice, SimulatedDriver};

    let driver = devices.iter().fold(SimulatedDriver::new(), |driver, index| {
        driver.with_device(
            *index,
            SimulatedDevice::qvga().named(format!("Simulated Camera {}", index)),
        )
    });
    Ok(Arc::new(driver))
}

#[cfg(not(feature = "simulation"))]
fn simulated_driver(_devices: &[u32]) -> Result<Arc<dyn Driver>> {
    Err(unsupported(BackendType::Simulation))
}

// 所有后端都编译进来时不会被调用
#[allow(dead_code)]
fn unsupported(backend: BackendType) -> CameraError {
    CameraError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!(
            "backend {} is not available in this build. Please check Cargo features.",
            backend
        ),
    ))
}

/// 辅助：获取首选后端类型
pub fn default_backend() -> BackendType {
    if cfg!(all(feature = "linux-v4l2", target_os = "linux")) {
        BackendType::V4L2
    } else {
        BackendType::Simulation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("v4l2".parse::<BackendType>().ok(), Some(BackendType::V4L2));
        assert_eq!("Simulation".parse::<BackendType>().ok(), Some(BackendType::Simulation));
        assert!("dshow".parse::<BackendType>().is_err());
    }

    #[cfg(feature = "simulation")]
    #[test]
    fn simulation_backend_exposes_requested_devices() {
        let driver = create_driver(BackendType::Simulation, &[0, 2]).expect("driver");
        let indices: Vec<u32> = driver
            .list_devices()
            .expect("list")
            .iter()
            .map(|d| d.index)
            .collect();
        assert_eq!(indices, vec![0, 2]);
    }
}
