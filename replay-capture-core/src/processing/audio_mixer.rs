use crate::models::stream::AudioFormat;
use crate::processing::wav_format::WavData;

/// Widest layout a mix is written in. Surround loopback is folded down to stereo.
pub const MAX_MIX_CHANNELS: u16 = 2;

/// Overlays PCM tracks onto a common format.
///
/// Works in f32 internally. Conversion scales by 32768 both ways, so 16-bit
/// input passes through a same-format overlay unchanged.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    pub target: AudioFormat,
}

impl AudioMixer {
    pub fn new(target: AudioFormat) -> Self {
        Self { target }
    }

    /// Mixer for the higher sample rate and larger channel count of
    /// `formats`, capped at `MAX_MIX_CHANNELS`.
    pub fn reconciling(formats: &[AudioFormat]) -> Option<Self> {
        let sample_rate = formats.iter().map(|f| f.sample_rate).max()?;
        let channels = formats.iter().map(|f| f.channels).max()?.min(MAX_MIX_CHANNELS);
        Some(Self::new(AudioFormat { sample_rate, channels }))
    }

    /// Convert one track to the target rate and channel layout.
    pub fn conform(&self, track: &WavData) -> Vec<f32> {
        let samples = i16_to_f32(&track.samples);
        let remapped = remap_channels(&samples, track.format.channels as usize, self.target.channels as usize);
        resample(
            &remapped,
            self.target.channels as usize,
            track.format.sample_rate as f64,
            self.target.sample_rate as f64,
        )
    }

    /// Sum all tracks sample-by-sample from offset 0.
    ///
    /// The result is as long as the longest track; shorter tracks are
    /// padded with silence. Sums are clamped to the 16-bit range.
    pub fn overlay(&self, tracks: &[&WavData]) -> Vec<i16> {
        let conformed: Vec<Vec<f32>> = tracks.iter().map(|t| self.conform(t)).collect();
        let len = conformed.iter().map(Vec::len).max().unwrap_or(0);

        let mut mixed = vec![0.0f32; len];
        for track in &conformed {
            for (out, sample) in mixed.iter_mut().zip(track) {
                *out += sample;
            }
        }
        f32_to_i16(&mixed)
    }
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Convert back to 16-bit, clamping out-of-range values.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Change the channel layout of interleaved audio.
///
/// Mono is duplicated into every output channel and a mono output averages
/// the input channels. Narrowing a multichannel layout folds input channel
/// `i` into output `i % to` and averages each group. Widening keeps the
/// existing channels in order and fills the extra ones with the per-frame
/// average.
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frame_count = samples.len() / from;
    let mut out = Vec::with_capacity(frame_count * to);
    for frame in samples.chunks_exact(from) {
        let average = frame.iter().sum::<f32>() / from as f32;
        for ch in 0..to {
            let value = if from == 1 {
                frame[0]
            } else if to == 1 || ch >= from {
                average
            } else if to < from {
                let (sum, count) = frame
                    .iter()
                    .skip(ch)
                    .step_by(to)
                    .fold((0.0f32, 0usize), |(sum, count), &v| (sum + v, count + 1));
                sum / count as f32
            } else {
                frame[ch]
            };
            out.push(value);
        }
    }
    out
}

/// Linear interpolation resampling for interleaved audio with any channel count.
pub fn resample(samples: &[f32], channels: usize, source_rate: f64, target_rate: f64) -> Vec<f32> {
    if channels == 0 || samples.is_empty() || (source_rate - target_rate).abs() < 0.01 || source_rate <= 0.0 {
        return samples.to_vec();
    }

    let frame_count = samples.len() / channels;
    let ratio = target_rate / source_rate;
    let output_frames = (frame_count as f64 * ratio).round() as usize;
    if output_frames == 0 {
        return Vec::new();
    }

    let mut output = vec![0.0f32; output_frames * channels];
    for i in 0..output_frames {
        let source_index = i as f64 / ratio;
        let index = source_index as usize;
        let fraction = (source_index - index as f64) as f32;

        for ch in 0..channels {
            output[i * channels + ch] = if index + 1 < frame_count {
                samples[index * channels + ch] * (1.0 - fraction) + samples[(index + 1) * channels + ch] * fraction
            } else if index < frame_count {
                samples[index * channels + ch]
            } else {
                0.0
            };
        }
    }
    output
}

/// Peak absolute level of 16-bit samples, normalized to 0.0–1.0.
pub fn peak_level(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| (s as i32).unsigned_abs())
        .max()
        .map(|peak| peak as f32 / 32768.0)
        .unwrap_or(0.0)
}
