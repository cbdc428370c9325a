//! Audio loading for evaluation examples
//!
//! Decodes an example file into mono `f32` samples at 16 kHz, the rate the
//! acoustic model expects. WAV goes through hound, compressed formats
//! through symphonia.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use crate::error::{EvalError, Result};

/// Target sample rate for the acoustic model
pub const SAMPLE_RATE: u32 = 16000;

/// Resampler chunk size (frames)
const RESAMPLE_CHUNK: usize = 1024;

/// Decodes an audio file into mono samples at [`SAMPLE_RATE`].
pub trait AudioLoader {
    fn load(&self, path: &Path) -> Result<Vec<f32>>;
}

/// File loader dispatching on extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileAudioLoader;

impl AudioLoader for FileAudioLoader {
    fn load(&self, path: &Path) -> Result<Vec<f32>> {
        load_audio(path)
    }
}

/// Load audio from file (WAV, MP3, FLAC, OGG)
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| EvalError::audio_load("Could not determine file extension"))?;

    let (samples, sample_rate) = match extension.to_lowercase().as_str() {
        "wav" => load_wav(path)?,
        "mp3" | "flac" | "ogg" => load_with_symphonia(path)?,
        _ => {
            return Err(EvalError::audio_load(format!(
                "Unsupported audio format: {extension}"
            )))
        }
    };

    if samples.is_empty() {
        return Err(EvalError::audio_load(format!(
            "No audio samples decoded from {}",
            path.display()
        )));
    }

    let samples = resample(&samples, sample_rate, SAMPLE_RATE)?;
    info!(path = %path.display(), samples = samples.len(), "example audio at {SAMPLE_RATE} Hz");
    Ok(samples)
}

/// Load WAV file, returning mono samples and the native rate
fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)
        .map_err(|e| EvalError::audio_load(format!("Failed to open WAV: {e}")))?;

    let spec = reader.spec();
    debug!(
        path = %path.display(),
        rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        "wav example opened"
    );

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|sample| sample as f32 / 32768.0))
            .collect::<std::result::Result<Vec<_>, _>>(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|sample| sample as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<_>, _>>(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|sample| sample as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<_>, _>>(),
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect(),
        (format, bits) => {
            return Err(EvalError::audio_load(format!(
                "Unsupported WAV sample format: {format:?} {bits} bits"
            )))
        }
    }
    .map_err(|e| EvalError::audio_load(format!("Failed to read samples: {e}")))?;

    Ok((downmix(samples, spec.channels as usize), spec.sample_rate))
}

/// Load audio file using Symphonia (MP3, FLAC, etc.)
fn load_with_symphonia(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = std::fs::File::open(path)
        .map_err(|e| EvalError::audio_load(format!("Failed to open file: {e}")))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| EvalError::audio_load(format!("Failed to probe format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EvalError::audio_load("No audio tracks found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| EvalError::audio_load("Could not determine sample rate"))?;
    let channels_count = track.codec_params.channels.map_or(1, |c| c.count());
    let codec_params = track.codec_params.clone();

    debug!(
        path = %path.display(),
        rate = sample_rate,
        channels = channels_count,
        "compressed example opened"
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| EvalError::audio_load(format!("Failed to create decoder: {e}")))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(EvalError::audio_load(format!("Failed to read packet: {e}")));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frame: skip it, keep the rest of the stream
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                warn!(path = %path.display(), "skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(EvalError::audio_load(format!("Failed to decode: {e}"))),
        };

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
        });
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    Ok((downmix(samples, channels_count), sample_rate))
}

/// Average interleaved channels into one
fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Resample mono audio with a sinc interpolator.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    debug!("Resampling from {} Hz to {} Hz", from_rate, to_rate);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(to_rate) / f64::from(from_rate);

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| EvalError::audio_load(format!("Resampler init: {e}")))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(delay + expected + RESAMPLE_CHUNK);
    let mut chunks = samples.chunks(RESAMPLE_CHUNK);
    // Zero chunks after the input flush the filter tail
    while output.len() < delay + expected {
        let mut input = chunks.next().map(<[f32]>::to_vec).unwrap_or_default();
        input.resize(RESAMPLE_CHUNK, 0.0);

        let resampled = resampler
            .process(&[input], None)
            .map_err(|e| EvalError::audio_load(format!("Resample: {e}")))?;
        match resampled.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => return Err(EvalError::audio_load("Resampler produced no output")),
        }
    }

    // Leading filter delay out, padding past the real end out
    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let v = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_wav_at_target_rate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.wav");
        write_wav(&path, SAMPLE_RATE, 1, 1600);

        let samples = load_audio(&path).unwrap();
        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_load_stereo_wav_resamples() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("b.wav");
        // 0.5 s at 48 kHz stereo
        write_wav(&path, 48000, 2, 24000);

        let samples = FileAudioLoader.load(&path).unwrap();
        let ratio = samples.len() as f64 / 8000.0;
        assert!((ratio - 1.0).abs() < 0.05, "got {} samples", samples.len());
    }

    #[test]
    fn test_resample_is_time_aligned() {
        // 0.5 s of a ~230 Hz tone at 48 kHz
        let input: Vec<f32> = (0..24000).map(|i| (i as f32 * 0.03).sin() * 0.5).collect();
        let output = resample(&input, 48000, SAMPLE_RATE).unwrap();
        assert_eq!(output.len(), 8000);

        // Output sample j sits at input sample 3j; skip the filter edges
        let max_err = (500..7500)
            .map(|j| (output[j] - (3.0 * j as f32 * 0.03).sin() * 0.5).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 0.1, "max error {max_err}");
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&input, SAMPLE_RATE, SAMPLE_RATE).unwrap(), input);
    }

    #[test]
    fn test_downmix() {
        assert_eq!(downmix(vec![1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(vec![0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_audio("/tmp/example.aiff").unwrap_err();
        assert!(matches!(err, EvalError::AudioLoad(_)));
    }

    #[test]
    fn test_missing_extension() {
        assert!(load_audio("/tmp/example").is_err());
    }

    #[test]
    fn test_garbage_mp3_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(load_audio(&path), Err(EvalError::AudioLoad(_))));
    }
}
