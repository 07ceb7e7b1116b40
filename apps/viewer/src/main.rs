use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wave2notes_audio::{AudioSource, BackendKind};
use wave2notes_domain::TranscriptionResult;
use wave2notes_services::TranscriptionClient;

mod app;
mod settings;

use app::ViewerApp;
use settings::ViewerSettings;

#[derive(Debug, Parser)]
#[command(name = "wave2notes-viewer", about = "Play a transcription as a falling-note piano roll")]
struct Args {
    /// Transcription result JSON on disk.
    #[arg(long, conflicts_with = "fetch")]
    result: Option<PathBuf>,
    /// Result path to download from the transcription service.
    #[arg(long)]
    fetch: Option<String>,
    /// Base URL of the transcription service.
    #[arg(long)]
    service: Option<String>,
    /// Audio rendering to play along; defaults to the result's MIDI file.
    #[arg(long)]
    audio: Option<String>,
    /// Audio backend: native or null. media-element needs a browser host and
    /// falls back to silent playback here.
    #[arg(long)]
    backend: Option<BackendKind>,
    /// Output device name for native playback.
    #[arg(long)]
    device: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut settings = ViewerSettings::load().unwrap_or_else(|err| {
        warn!(?err, "ignoring unreadable settings");
        ViewerSettings::default()
    });
    if let Some(device) = args.device.clone() {
        settings.output_device = Some(device);
    }
    let rt = Arc::new(Runtime::new()?);

    let service_url = args.service.clone().or_else(|| settings.service_url.clone());
    let client = service_url.map(TranscriptionClient::new);
    let result = load_result(&args, client.as_ref(), &rt)?;
    info!(
        notes = result.notes.len(),
        rejected = result.rejected,
        "loaded transcription"
    );

    let audio = args
        .audio
        .clone()
        .or_else(|| {
            let midi = result.midi_file.as_deref()?;
            Some(match &client {
                Some(client) => client.resolve_asset(midi),
                None => midi.to_string(),
            })
        })
        .map(|raw| AudioSource::parse(&raw));
    let backend = args
        .backend
        .or(settings.backend)
        .unwrap_or_else(BackendKind::for_target);

    let options = eframe::NativeOptions::default();
    let rt_clone = rt.clone();
    eframe::run_native(
        "Wave2Notes Viewer",
        options,
        Box::new(move |cc| {
            Box::new(ViewerApp::new(
                &cc.egui_ctx,
                rt_clone.clone(),
                settings,
                result,
                backend,
                audio,
            ))
        }),
    )
    .map_err(|e| anyhow::anyhow!(format!("{e:?}")))?;
    Ok(())
}

fn load_result(
    args: &Args,
    client: Option<&TranscriptionClient>,
    rt: &Runtime,
) -> anyhow::Result<TranscriptionResult> {
    if let Some(path) = &args.result {
        return TranscriptionResult::load(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    let remote = args
        .fetch
        .as_deref()
        .context("pass --result <file> or --fetch <path>")?;
    let client = client.context("--fetch needs --service or a saved service URL")?;
    Ok(rt.block_on(client.fetch_result(remote))?)
}
