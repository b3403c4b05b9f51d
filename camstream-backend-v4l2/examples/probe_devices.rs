#[cfg(target_os = "linux")]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use camstream_backend_v4l2::V4l2Driver;
    use camstream_core::builder::CaptureConfig;
    use camstream_core::traits::Driver;
    use std::time::{Duration, Instant};

    // 1. 初始化日志，以便看到驱动里的 tracing::info!
    tracing_subscriber::fmt::init();

    println!("=== camstream V4L2 probe ===");

    // 2. 枚举设备
    let driver = V4l2Driver::new();
    let devices = driver.list_devices()?;
    if devices.is_empty() {
        anyhow::bail!("No cameras found! Please plug in a USB camera.");
    }

    println!("Found {} devices:", devices.len());
    for dev in &devices {
        println!(
            "  [{}] {} ({}) - {}",
            dev.index,
            dev.name,
            dev.id,
            dev.bus_info.as_deref().unwrap_or("N/A")
        );
    }

    // 3. 用流媒体服务的标准配置打开第一个设备，读几帧测一下帧率
    let index = devices[0].index;
    let mut device = driver
        .open(index, &CaptureConfig::standard())
        .context("Failed to open camera")?;

    let started = Instant::now();
    let mut frames = 0u32;
    let mut misses = 0u32;
    while started.elapsed() < Duration::from_secs(3) {
        match device.read() {
            Ok(Some(frame)) => {
                frames += 1;
                if frames == 1 {
                    println!(
                        "First frame: {}x{} {} ({} bytes)",
                        frame.width,
                        frame.height,
                        frame.format,
                        frame.data.len()
                    );
                }
            }
            Ok(None) => misses += 1,
            Err(e) => {
                eprintln!("Capture error: {}", e);
                misses += 1;
            }
        }
    }

    let secs = started.elapsed().as_secs_f64();
    println!(
        "{} frames in {:.1}s ({:.1} fps), {} misses",
        frames,
        secs,
        frames as f64 / secs,
        misses
    );

    // 4. device 在这里 Drop，设备随之释放
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    println!("This example is only supported on Linux with V4L2.");
}
