use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::probe::unsupported;
use crate::BackendError;

/// Fully decoded audio, interleaved `f32` frames.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate.max(1)))
    }
}

pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<DecodedAudio, BackendError> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).map_err(|err| {
        BackendError::BackendUnavailable(format!("open audio file {:?}: {err}", path_ref))
    })?;
    let extension = path_ref.extension().and_then(|ext| ext.to_str());
    decode_media(Box::new(file), extension, path_ref)
}

/// Decodes every packet of the default track. Undecodable packets are skipped.
pub fn decode_media(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
    label: &Path,
) -> Result<DecodedAudio, BackendError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| unsupported(label, err))?;
    let mut format = probed.format;
    let track = format.default_track().ok_or_else(|| {
        BackendError::UnsupportedSource(format!("{:?} has no audio track", label))
    })?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| unsupported(label, err))?;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(unsupported(label, err)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(buffer) => {
                let spec = *buffer.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
                interleaved.copy_interleaved_ref(buffer);
                samples.extend_from_slice(interleaved.samples());
            }
            Err(SymphoniaError::DecodeError(_)) => skipped += 1,
            Err(err) => return Err(unsupported(label, err)),
        }
    }
    if skipped > 0 {
        warn!(path = ?label, skipped, "skipped undecodable packets");
    }
    let decoded = DecodedAudio {
        sample_rate,
        channels,
        samples,
    };
    debug!(path = ?label, frames = decoded.frames(), sample_rate, channels, "decoded audio");
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn stereo_wav(sample_rate: u32, frames: &[(i16, i16)]) -> Vec<u8> {
        let data_len = (frames.len() * 4) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 4).to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for (left, right) in frames {
            bytes.extend_from_slice(&left.to_le_bytes());
            bytes.extend_from_slice(&right.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn wav_decodes_interleaved() {
        let frames = vec![(i16::MAX, 0); 400];
        let bytes = stereo_wav(4_000, &frames);
        let decoded =
            decode_media(Box::new(Cursor::new(bytes)), Some("wav"), Path::new("tone.wav")).unwrap();
        assert_eq!(decoded.sample_rate, 4_000);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 400);
        assert_eq!(decoded.duration(), Duration::from_millis(100));
        assert!(decoded.samples[0] > 0.99);
        assert_eq!(decoded.samples[1], 0.0);
    }

    #[test]
    fn missing_file_is_unavailable() {
        assert!(matches!(
            decode_file("does-not-exist.ogg"),
            Err(BackendError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let result = decode_media(
            Box::new(Cursor::new(vec![0x13u8; 512])),
            None,
            Path::new("noise.bin"),
        );
        assert!(result.is_err());
    }
}
