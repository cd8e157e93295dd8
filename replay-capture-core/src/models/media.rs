use std::sync::Arc;

/// One captured screen image in packed BGR24.
///
/// Pixel data is shared, so cloning a frame (as snapshots do) never copies
/// the image itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the payload length agrees with the tagged resolution.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 3
    }
}

/// A fixed-size block of interleaved 16-bit PCM.
///
/// Sample rate and channel count are fixed per stream when it is opened;
/// the chunk only records its channel count so snapshot writing can reject
/// foreign data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub channels: u16,
    pub samples: Arc<[i16]>,
}

impl AudioChunk {
    pub fn new(channels: u16, samples: Vec<i16>) -> Self {
        Self {
            channels,
            samples: samples.into(),
        }
    }

    /// Number of frames (samples per channel) in this chunk.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Little-endian byte view, as written into a WAV data chunk.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for sample in self.samples.iter() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }
}
