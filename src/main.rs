//! Application entry point: live direction tracking and steered recording.
//!
//! # Usage
//!
//! ```text
//! array-steer                       track and record until Enter is pressed
//! array-steer calibrate <deg> <s>   calibrate against a source at <deg> for <s> seconds
//! array-steer devices               list input devices for audio.device_index
//! ```
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG` overrides the `info` default).
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the [`ArraySystem`] (validates the configuration).
//! 5. Open the array with cpal and start the worker.
//! 6. Run the requested command, then stop and save the recording.

use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use array_steer::{
    array::NUM_MICS,
    audio::{envelope, ArrayCapture},
    config::AppConfig,
    pipeline::ArraySystem,
};

/// Time the estimator gets to lock on before calibration starts.
const SETTLE_TIME: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Run,
    Devices,
    Calibrate { reference_deg: f64, secs: f64 },
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args {
        [] => Ok(Command::Run),
        [cmd] if cmd == "devices" => Ok(Command::Devices),
        [cmd, angle, secs] if cmd == "calibrate" => {
            let reference_deg: f64 = angle
                .parse()
                .with_context(|| format!("invalid reference angle '{angle}'"))?;
            let secs: f64 = secs
                .parse()
                .with_context(|| format!("invalid duration '{secs}'"))?;
            if !(secs > 0.0 && secs.is_finite()) {
                bail!("calibration duration must be positive");
            }
            Ok(Command::Calibrate { reference_deg, secs })
        }
        _ => bail!("usage: array-steer [devices | calibrate <reference_deg> <seconds>]"),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Print the input devices and whether each can carry the array.
fn list_devices(config: &AppConfig) -> Result<()> {
    let required = config.audio.capture_channels.max(NUM_MICS as u16);
    let devices = ArrayCapture::list_devices().context("listing input devices")?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }
    for device in devices {
        println!(
            "[{}] {}  ({} ch){}{}",
            device.index,
            device.name,
            device.max_input_channels,
            if device.is_default { "  default" } else { "" },
            if device.can_host(required) { "  usable" } else { "" },
        );
    }
    println!("Set audio.device_index or audio.device_name in settings.toml to choose one.");
    Ok(())
}

/// Print a one-line status every second until Enter is pressed.
async fn track(system: &ArraySystem) {
    let mut enter = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)
    });
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    println!("Tracking. Press Enter to stop.");

    loop {
        tokio::select! {
            _ = &mut enter => break,
            _ = ticker.tick() => {
                let status = system.status();
                let meter: String = envelope(&system.monitor_snapshot(), 20)
                    .iter()
                    .map(|&b| if b > 0.1 { '#' } else if b > 0.01 { '+' } else { '.' })
                    .collect();
                print!(
                    "\r{:>5.1} deg  conf {:.2}  out {:>6.1} dBFS  comp {:.2}  [{meter}]  blocks {}  overflows {}  slow {}   ",
                    status.angle_deg,
                    status.confidence,
                    status.output_rms_dbfs,
                    status.compressor_gain,
                    status.blocks_processed,
                    status.overflows,
                    status.slow_blocks,
                );
                let _ = std::io::stdout().flush();
            }
        }
    }
    println!();
}

async fn calibrate(system: &ArraySystem, reference_deg: f64, secs: f64) {
    println!("Hold a source at {reference_deg:.1} deg.");
    tokio::time::sleep(SETTLE_TIME).await;
    match system
        .calibrate_with_report(reference_deg, Duration::from_secs_f64(secs))
        .await
    {
        Ok(report) if report.applied => println!(
            "Offset {:.1} deg (median error {:.1}, std {:.1}, {} samples)",
            report.offset_deg, report.median_error_deg, report.std_dev_deg, report.samples_used
        ),
        Ok(report) => println!(
            "Median error {:.1} deg is within threshold; no offset applied",
            report.median_error_deg
        ),
        Err(e) => println!("Calibration failed: {e}"),
    }
}

async fn run(config: AppConfig, command: Command) -> Result<()> {
    let mut system = ArraySystem::new(config.clone())?;
    let capture = ArrayCapture::open(&config.audio).context("opening microphone array")?;
    let feed = system.start()?;
    let stream = capture.start(feed).context("starting capture")?;

    if let Command::Calibrate { reference_deg, secs } = command {
        calibrate(&system, reference_deg, secs).await;
    } else {
        track(&system).await;
    }

    let saved = system.stop(command == Command::Run).await?;
    drop(stream);

    let status = system.status();
    log::info!(
        "{} overflows, {} faults, {} slow blocks, max {:.1} ms per block",
        status.overflows,
        status.faults,
        status.slow_blocks,
        status.max_processing_ms
    );
    if let Some(saved) = saved {
        println!("Saved {}", saved.beamformed.display());
        if let Some(raw) = saved.raw {
            println!("Saved {}", raw.display());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("array-steer starting up");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    if command == Command::Devices {
        return list_devices(&config);
    }

    // 3. Tokio runtime (persistence and calibration I/O only)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config, command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_runs() {
        assert_eq!(parse_args(&[]).expect("parse"), Command::Run);
    }

    #[test]
    fn calibrate_args() {
        let cmd = parse_args(&args(&["calibrate", "90", "10"])).expect("parse");
        assert_eq!(
            cmd,
            Command::Calibrate {
                reference_deg: 90.0,
                secs: 10.0
            }
        );
    }

    #[test]
    fn devices_command() {
        assert_eq!(parse_args(&args(&["devices"])).expect("parse"), Command::Devices);
        assert!(parse_args(&args(&["devices", "extra"])).is_err());
    }

    #[test]
    fn bad_args_rejected() {
        assert!(parse_args(&args(&["calibrate", "x", "10"])).is_err());
        assert!(parse_args(&args(&["calibrate", "90", "0"])).is_err());
        assert!(parse_args(&args(&["record"])).is_err());
    }
}
