use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wave2notes_domain::{pitch_name, TranscriptionResult};
use wave2notes_player::{NoteTrack, NoteWindow, WindowConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Summarise a transcription result and the per-frame note load of its playback"
)]
struct Args {
    /// Path to a transcription result JSON file
    input: PathBuf,
    /// Simulated frames per second for the window sweep
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Seconds of upcoming notes kept on screen
    #[arg(long, default_value_t = 3.0)]
    look_ahead: f64,
    /// Seconds of past notes kept on screen
    #[arg(long, default_value_t = 1.0)]
    look_behind: f64,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Longest sweep the tool will simulate, about 46 hours at 60 fps.
const MAX_SWEEP_FRAMES: f64 = 10_000_000.0;

#[derive(Debug, Default, Serialize, PartialEq)]
struct Report {
    notes: usize,
    rejected: usize,
    lowest: Option<String>,
    highest: Option<String>,
    duration: f64,
    indexed: bool,
    frames: usize,
    peak_visible: usize,
    peak_active: usize,
}

fn sweep(result: &TranscriptionResult, config: WindowConfig, fps: u32) -> Result<Report> {
    let duration = result.total_duration.unwrap_or(0.0).max(result.notes_end());
    let fps = f64::from(fps.max(1));
    let planned = (duration * fps).floor() + 1.0;
    if planned > MAX_SWEEP_FRAMES {
        bail!("a {duration}s sweep at {fps} fps needs {planned} frames, over the frame limit");
    }

    let track = NoteTrack::new(result.notes.clone());
    let mut report = Report {
        notes: track.len(),
        rejected: result.rejected,
        lowest: track.notes().iter().map(|n| n.pitch()).min().map(pitch_name),
        highest: track.notes().iter().map(|n| n.pitch()).max().map(pitch_name),
        duration,
        indexed: track.is_indexed(),
        ..Report::default()
    };

    let mut window = NoteWindow::new(config);
    let mut frame = 0usize;
    loop {
        let time = frame as f64 / fps;
        if time > duration {
            break;
        }
        window.update(&track, time);
        report.peak_visible = report.peak_visible.max(window.visible().len());
        report.peak_active = report.peak_active.max(window.active().len());
        frame += 1;
    }
    report.frames = frame;
    Ok(report)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let result = TranscriptionResult::load(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    info!(notes = result.notes.len(), "loaded transcription");

    let config = WindowConfig {
        look_ahead: args.look_ahead,
        look_behind: args.look_behind,
    };
    let report = sweep(&result, config, args.fps)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("notes:        {} ({} rejected)", report.notes, report.rejected);
    if let (Some(lowest), Some(highest)) = (&report.lowest, &report.highest) {
        println!("pitch span:   {lowest} .. {highest}");
    }
    println!("duration:     {:.2}s", report.duration);
    println!(
        "window scan:  {}",
        if report.indexed { "indexed" } else { "linear" }
    );
    println!("frames:       {} at {} fps", report.frames, args.fps);
    println!("peak visible: {}", report.peak_visible);
    println!("peak active:  {}", report.peak_active);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT: &str = r#"{
        "success": true,
        "notes": [
            {"pitch": 60, "time": 0.0, "duration": 1.0, "velocity": 0.9},
            {"pitch": 64, "time": 0.5, "duration": 1.0},
            {"pitch": 67, "time": 0.5, "duration": 0.5, "velocity_midi": 100},
            {"pitch": -1, "time": 1.0, "duration": 0.5}
        ]
    }"#;

    #[test]
    fn sweep_reports_peaks() {
        let result = TranscriptionResult::from_slice(RESULT.as_bytes()).unwrap();
        let report = sweep(&result, WindowConfig::default(), 60).unwrap();
        assert_eq!(report.notes, 3);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.lowest.as_deref(), Some("C4"));
        assert_eq!(report.highest.as_deref(), Some("G4"));
        assert_eq!(report.duration, 1.5);
        assert_eq!(report.peak_visible, 3);
        assert_eq!(report.peak_active, 3);
        assert_eq!(report.frames, 91);
        assert!(!report.indexed);
    }

    #[test]
    fn oversized_duration_is_refused() {
        let body = r#"{
            "success": true,
            "notes": [{"pitch": 60, "time": 0.0, "duration": 1.0}],
            "debug_info": {"total_duration": 1e20}
        }"#;
        let result = TranscriptionResult::from_slice(body.as_bytes()).unwrap();
        assert_eq!(result.total_duration, Some(1e20));
        assert!(sweep(&result, WindowConfig::default(), 60).is_err());
    }
}
