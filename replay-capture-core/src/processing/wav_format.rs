//! 16-bit PCM WAV reading and writing.
//!
//! Snapshots are always canonical 44-byte-header files written here; the
//! reader additionally skips unknown chunks (`LIST`, `fact`) so files from
//! other tools can be overlaid too.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::models::error::CaptureError;
use crate::models::stream::AudioFormat;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Decoded PCM content of a WAV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavData {
    pub format: AudioFormat,
    /// Interleaved samples.
    pub samples: Vec<i16>,
}

impl WavData {
    pub fn frames(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.samples.len() / self.format.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }
}

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Write interleaved 16-bit blocks as one WAV file.
///
/// `blocks` is iterated twice: once to size the header, once to write.
pub fn write_wav<'a, I>(path: &Path, format: AudioFormat, blocks: I) -> Result<u64, CaptureError>
where
    I: IntoIterator<Item = &'a [i16]> + Clone,
{
    let sample_count: u64 = blocks.clone().into_iter().map(|b| b.len() as u64).sum();
    let data_size = sample_count * 2;
    if data_size > u32::MAX as u64 - 36 {
        return Err(CaptureError::StorageError(format!(
            "{} bytes of audio exceed the WAV size limit",
            data_size
        )));
    }

    let file = File::create(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);

    let header = generate_wav_header(format.sample_rate, 16, format.channels, data_size as u32);
    writer.write_all(&header)?;
    for block in blocks {
        for sample in block {
            writer.write_all(&sample.to_le_bytes())?;
        }
    }
    writer.flush()?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| CaptureError::StorageError(format!("failed to sync {}: {}", path.display(), e)))?;

    Ok(WAV_HEADER_SIZE as u64 + data_size)
}

/// Read a 16-bit PCM WAV file.
pub fn read_wav(path: &Path) -> Result<WavData, CaptureError> {
    let file = File::open(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to open {}: {}", path.display(), e)))?;
    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes)?;
    parse_wav(&bytes).map_err(|reason| CaptureError::EncodingFailed(format!("{}: {}", path.display(), reason)))
}

fn parse_wav(bytes: &[u8]) -> Result<WavData, String> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE file".into());
    }

    let mut format: Option<AudioFormat> = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([bytes[offset + 4], bytes[offset + 5], bytes[offset + 6], bytes[offset + 7]])
            as usize;
        let body_start = offset + 8;
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err("truncated fmt chunk".into());
                }
                let code = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bit_depth = u16::from_le_bytes([body[14], body[15]]);
                // 0xFFFE is WAVE_FORMAT_EXTENSIBLE; its sub-format is assumed PCM.
                if code != 1 && code != 0xFFFE {
                    return Err(format!("unsupported format code {}", code));
                }
                if bit_depth != 16 {
                    return Err(format!("unsupported bit depth {}", bit_depth));
                }
                if channels == 0 || sample_rate == 0 {
                    return Err("zero channels or sample rate".into());
                }
                format = Some(AudioFormat { sample_rate, channels });
            }
            b"data" => {
                let format = format.ok_or("data chunk before fmt chunk")?;
                let samples = body
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                return Ok(WavData { format, samples });
            }
            _ => {}
        }

        // Chunks are word-aligned.
        offset = body_start.saturating_add(size).saturating_add(size & 1);
    }

    Err("no data chunk".into())
}
