//! 服务配置：JSON 文件 (路径来自 `CAMSTREAM_CONFIG`) + 环境变量覆盖。
//! 文件里每个字段都可以省略：流参数省略时沿用 `StreamConfig::default()`。

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use camstream::videoio::backend::{default_backend, BackendType};
use camstream::videoio::StreamConfig;
use camstream_core::builder::{Priority, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use serde::Deserialize;

const DEFAULT_ADDR: &str = "0.0.0.0:5000";

/// 默认目录：名称 -> /dev/videoN
const DEFAULT_CATALOG: [(&str, u32); 3] = [("camera1", 0), ("camera2", 2), ("camera3", 4)];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServerConfigFile {
    addr: Option<String>,
    backend: Option<String>,
    cameras: Option<BTreeMap<String, u32>>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    jpeg_quality: Option<u8>,
    poll_interval_ms: Option<u64>,
    idle_timeout_secs: Option<u64>,
    pacing_interval_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    stop_timeout_ms: Option<u64>,
    buffer_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub backend: BackendType,
    pub cameras: BTreeMap<String, u32>,
    pub stream: StreamConfig,
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("CAMSTREAM_CONFIG").ok().as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => ServerConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从 JSON 文本构造 (不读取环境变量)
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ServerConfigFile = serde_json::from_str(json).context("invalid config JSON")?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 设备索引列表 (去重、排序)，仿真后端据此创建设备
    pub fn device_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.cameras.values().copied().collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    fn from_file(file: ServerConfigFile) -> Result<Self> {
        let addr = file.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let backend = match file.backend.as_deref() {
            Some(name) => name
                .parse()
                .map_err(|_| anyhow!("unknown backend {:?} (expected v4l2 or simulation)", name))?,
            None => default_backend(),
        };
        let cameras = file.cameras.unwrap_or_else(|| {
            DEFAULT_CATALOG
                .iter()
                .map(|(name, index)| (name.to_string(), *index))
                .collect()
        });

        let s = file.stream.unwrap_or_default();
        let defaults = StreamConfig::default();

        let mut capture = defaults.capture.clone();
        if s.width.is_some() || s.height.is_some() {
            let (w, h) = capture
                .preferred_resolution()
                .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
            capture.resolution_req = vec![(s.width.unwrap_or(w), s.height.unwrap_or(h), Priority::High)];
        }
        if let Some(fps) = s.fps {
            capture = capture.fps(fps, Priority::Medium);
        }
        if let Some(count) = s.buffer_count {
            capture = capture.buffer_count(count);
        }
        if let Some(ms) = s.read_timeout_ms {
            // 0 表示不设读帧期限
            capture = capture.read_timeout((ms > 0).then(|| Duration::from_millis(ms)));
        }

        let stream = StreamConfig {
            capture,
            poll_interval: s
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            idle_timeout: s
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            stop_timeout: s
                .stop_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stop_timeout),
            jpeg_quality: s.jpeg_quality.unwrap_or(defaults.jpeg_quality),
            pacing_interval: s
                .pacing_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.pacing_interval),
        };

        Ok(Self {
            addr,
            backend,
            cameras,
            stream,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("CAMSTREAM_ADDR") {
            if !addr.trim().is_empty() {
                self.addr = addr;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(anyhow!("camera catalog must not be empty"));
        }
        if self.stream.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        if self.stream.pacing_interval.is_zero() {
            return Err(anyhow!("pacing_interval_ms must be greater than zero"));
        }
        if self.stream.idle_timeout.is_zero() {
            return Err(anyhow!("idle_timeout_secs must be greater than zero"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ServerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = ServerConfig::from_json("{}").expect("config");
        assert_eq!(cfg.addr, DEFAULT_ADDR);
        assert_eq!(cfg.cameras.len(), 3);
        assert_eq!(cfg.cameras["camera2"], 2);
        assert_eq!(cfg.device_indices(), vec![0, 2, 4]);

        let defaults = StreamConfig::default();
        assert_eq!(cfg.stream.poll_interval, defaults.poll_interval);
        assert_eq!(cfg.stream.idle_timeout, defaults.idle_timeout);
        assert_eq!(cfg.stream.jpeg_quality, 30);
        assert_eq!(cfg.stream.capture.preferred_resolution(), Some((320, 240)));
        assert_eq!(cfg.stream.capture.target_fps(), Some(15));
        assert_eq!(cfg.stream.capture.read_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = ServerConfig::from_json(
            r#"{
                "addr": "127.0.0.1:8080",
                "backend": "simulation",
                "cameras": { "front": 1, "back": 1 },
                "stream": { "width": 640, "height": 480, "idle_timeout_secs": 3, "read_timeout_ms": 0 }
            }"#,
        )
        .expect("config");

        assert_eq!(cfg.addr, "127.0.0.1:8080");
        assert_eq!(cfg.backend, BackendType::Simulation);
        assert_eq!(cfg.device_indices(), vec![1]);
        assert_eq!(cfg.stream.idle_timeout, Duration::from_secs(3));
        assert_eq!(cfg.stream.capture.preferred_resolution(), Some((640, 480)));
        assert_eq!(cfg.stream.capture.read_timeout, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ServerConfig::from_json(r#"{ "backend": "dshow" }"#).is_err());
        assert!(ServerConfig::from_json(r#"{ "cameras": {} }"#).is_err());
        assert!(ServerConfig::from_json(r#"{ "stream": { "jpeg_quality": 0 } }"#).is_err());
        assert!(ServerConfig::from_json(r#"{ "stream": { "idle_timeout_secs": 0 } }"#).is_err());
        assert!(ServerConfig::from_json(r#"{ "port": 80 }"#).is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        for field in ["poll_interval_ms", "pacing_interval_ms", "idle_timeout_secs"] {
            let json = format!(r#"{{ "stream": {{ "{field}": 0 }} }}"#);
            assert!(ServerConfig::from_json(&json).is_err(), "{field} = 0 accepted");
        }
    }

    #[test]
    fn omitted_stream_settings_follow_library_defaults() {
        let cfg = ServerConfig::from_json(r#"{ "stream": { "fps": 30 } }"#).expect("config");
        let defaults = StreamConfig::default();

        assert_eq!(cfg.stream.capture.target_fps(), Some(30));
        assert_eq!(cfg.stream.capture.buffer_count, defaults.capture.buffer_count);
        assert_eq!(cfg.stream.capture.format_req, defaults.capture.format_req);
        assert_eq!(cfg.stream.stop_timeout, defaults.stop_timeout);
        assert_eq!(cfg.stream.pacing_interval, defaults.pacing_interval);
        assert_eq!(cfg.stream.jpeg_quality, defaults.jpeg_quality);
    }
}
