//! Re-framing of variable-size WASAPI packets into fixed-size chunks.

use std::collections::VecDeque;

use replay_capture_core::processing::audio_mixer::f32_to_i16;
use replay_capture_core::AudioChunk;

/// Sample layout of a shared-mode mix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFormat {
    /// 32-bit IEEE float, the usual shared-mode format.
    F32,
    /// 16-bit signed PCM.
    I16,
}

impl PacketFormat {
    /// Layout for a mix format's bit depth; `None` for anything else.
    pub fn from_bits(bits_per_sample: u16) -> Option<Self> {
        match bits_per_sample {
            32 => Some(Self::F32),
            16 => Some(Self::I16),
            _ => None,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::I16 => 2,
        }
    }
}

/// Collects interleaved packets and hands out chunks of exactly
/// `chunk_frames` frames.
#[derive(Debug)]
pub struct ChunkAccumulator {
    channels: u16,
    chunk_frames: usize,
    pending: VecDeque<i16>,
}

impl ChunkAccumulator {
    pub fn new(channels: u16, chunk_frames: usize) -> Self {
        Self {
            channels,
            chunk_frames,
            pending: VecDeque::new(),
        }
    }

    fn chunk_samples(&self) -> usize {
        self.chunk_frames * self.channels as usize
    }

    /// Append one packet of raw little-endian bytes.
    pub fn push_bytes(&mut self, format: PacketFormat, bytes: &[u8]) {
        match format {
            PacketFormat::F32 => {
                let floats: Vec<f32> = bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                self.pending.extend(f32_to_i16(&floats));
            }
            PacketFormat::I16 => {
                self.pending
                    .extend(bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])));
            }
        }
    }

    /// Append `frames` frames of silence.
    pub fn push_silence(&mut self, frames: usize) {
        let samples = frames * self.channels as usize;
        self.pending.extend(std::iter::repeat(0).take(samples));
    }

    /// Frames still missing before the next chunk is complete.
    pub fn missing_frames(&self) -> usize {
        let have = self.pending.len() / self.channels.max(1) as usize;
        self.chunk_frames.saturating_sub(have)
    }

    /// The next complete chunk, if enough samples have arrived.
    pub fn pop_chunk(&mut self) -> Option<AudioChunk> {
        let needed = self.chunk_samples();
        if needed == 0 || self.pending.len() < needed {
            return None;
        }
        let samples: Vec<i16> = self.pending.drain(..needed).collect();
        Some(AudioChunk::new(self.channels, samples))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn packets_are_reframed() {
        let mut acc = ChunkAccumulator::new(2, 3);
        acc.push_bytes(PacketFormat::I16, &[1, 0, 2, 0, 3, 0, 4, 0]);
        assert!(acc.pop_chunk().is_none());
        assert_eq!(acc.missing_frames(), 1);

        acc.push_bytes(PacketFormat::I16, &[5, 0, 6, 0, 7, 0, 8, 0]);
        let chunk = acc.pop_chunk().unwrap();
        assert_eq!(&chunk.samples[..], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(chunk.frames(), 3);
        assert!(acc.pop_chunk().is_none());
        assert_eq!(acc.missing_frames(), 2);
    }

    #[test]
    fn float_packets_are_converted() {
        let mut acc = ChunkAccumulator::new(1, 3);
        acc.push_bytes(PacketFormat::F32, &f32_bytes(&[0.0, 0.5, -2.0]));

        let chunk = acc.pop_chunk().unwrap();
        assert_eq!(chunk.samples[0], 0);
        assert_eq!(chunk.samples[1], 16384);
        assert_eq!(chunk.samples[2], i16::MIN);
    }

    #[test]
    fn silence_fills_a_gap() {
        let mut acc = ChunkAccumulator::new(1, 4);
        acc.push_bytes(PacketFormat::I16, &[9, 0]);
        acc.push_silence(acc.missing_frames());

        let chunk = acc.pop_chunk().unwrap();
        assert_eq!(&chunk.samples[..], &[9, 0, 0, 0]);
    }

    #[test]
    fn unsupported_depths_are_rejected() {
        assert_eq!(PacketFormat::from_bits(32), Some(PacketFormat::F32));
        assert_eq!(PacketFormat::from_bits(24), None);
    }
}
