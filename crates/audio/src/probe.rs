use std::fs::File;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::BackendError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceInfo {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub duration: Option<Duration>,
}

/// Reads the container header of a local audio file to confirm a decoder
/// exists for it. No packets are decoded.
pub fn probe_source<P: AsRef<Path>>(path: P) -> Result<SourceInfo, BackendError> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).map_err(|err| {
        BackendError::BackendUnavailable(format!("open audio file {:?}: {err}", path_ref))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path_ref.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| unsupported(path_ref, err))?;
    let format = probed.format;
    let track = format.default_track().ok_or_else(|| {
        BackendError::UnsupportedSource(format!("{:?} has no audio track", path_ref))
    })?;
    symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| unsupported(path_ref, err))?;

    let params = &track.codec_params;
    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            Duration::try_from_secs_f64(frames as f64 / rate as f64).ok()
        }
        _ => None,
    };
    let info = SourceInfo {
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count() as u16),
        duration,
    };
    debug!(path = ?path_ref, ?info, "probed audio source");
    Ok(info)
}

pub(crate) fn unsupported(path: &Path, err: SymphoniaError) -> BackendError {
    match err {
        SymphoniaError::IoError(io) => {
            BackendError::BackendUnavailable(format!("read {:?}: {io}", path))
        }
        other => BackendError::UnsupportedSource(format!("{:?}: {other}", path)),
    }
}
