use std::fmt;

/// 单路相机流的运行统计 (快照)
///
/// 计数器只增不减，跨越多次 start/stop 累计。
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamTelemetry {
    /// 成功采集的帧数
    pub frames_captured: u64,

    /// 瞬时读帧失败次数 (超时、驱动丢帧)
    pub read_failures: u64,

    /// 因无人观看而自动释放设备的次数
    pub idle_evictions: u64,

    /// 成功打开设备的次数
    pub starts: u64,
}

impl fmt::Debug for StreamTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTelemetry")
            .field("frames", &self.frames_captured)
            .field("read_failures", &self.read_failures)
            .field("evictions", &self.idle_evictions)
            .field("starts", &self.starts)
            .finish()
    }
}

/// 简单的状态指示灯
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamHealth {
    /// 从未启动过
    Idle,
    Healthy,
    /// 读帧失败占比过高
    Degraded,
}

impl StreamTelemetry {
    /// 基于计数器的粗略健康评估
    pub fn assess_health(&self) -> StreamHealth {
        if self.starts == 0 {
            return StreamHealth::Idle;
        }

        let attempts = self.frames_captured + self.read_failures;
        // 至少积累一些样本再下结论
        if attempts >= 20 && self.read_failures * 2 > attempts {
            return StreamHealth::Degraded;
        }

        StreamHealth::Healthy
    }

    /// 导出为 JSON，供状态接口使用
    #[cfg(feature = "serialize")]
    pub fn export_state(&self) -> serde_json::Value {
        serde_json::json!({
            "frames_captured": self.frames_captured,
            "read_failures": self.read_failures,
            "idle_evictions": self.idle_evictions,
            "starts": self.starts,
            "health": self.assess_health(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_started_is_idle() {
        assert_eq!(StreamTelemetry::default().assess_health(), StreamHealth::Idle);
    }

    #[test]
    fn mostly_failing_reads_degrade() {
        let telemetry = StreamTelemetry {
            frames_captured: 5,
            read_failures: 30,
            idle_evictions: 0,
            starts: 1,
        };
        assert_eq!(telemetry.assess_health(), StreamHealth::Degraded);

        let few_samples = StreamTelemetry {
            read_failures: 3,
            starts: 1,
            ..Default::default()
        };
        assert_eq!(few_samples.assess_health(), StreamHealth::Healthy);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn exported_state_carries_health() {
        let telemetry = StreamTelemetry {
            frames_captured: 10,
            starts: 1,
            ..Default::default()
        };
        let value = telemetry.export_state();
        assert_eq!(value["frames_captured"], 10);
        assert_eq!(value["health"], "Healthy");
    }
}
