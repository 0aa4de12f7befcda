//! Audio payloads as they cross the wire.
//!
//! The server ships synthesized speech as raw PCM chunks tagged with a
//! dtype and a shape; the client never inspects the shape beyond the
//! sample count. Capture-side audio never crosses the wire at all.

use serde::{Deserialize, Serialize};

/// Sample type of a PCM chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleDtype {
    /// Signed 16-bit little-endian integers.
    Int16,
    /// 32-bit little-endian floats in [-1.0, 1.0].
    Float32,
}

impl SampleDtype {
    /// Wire label used in the protobuf `dtype` field.
    #[must_use]
    pub const fn wire_label(self) -> &'static str {
        match self {
            Self::Int16 => "int16",
            Self::Float32 => "float32",
        }
    }

    /// Parse a wire label; unknown labels are reported back to the caller.
    pub fn from_wire_label(label: &str) -> Result<Self, UnknownDtype> {
        match label {
            "int16" => Ok(Self::Int16),
            "float32" => Ok(Self::Float32),
            other => Err(UnknownDtype(other.to_string())),
        }
    }

    /// Bytes per sample for this dtype.
    #[must_use]
    pub const fn sample_width(self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Float32 => 4,
        }
    }
}

/// A `dtype` label that names no known sample type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown audio dtype {0:?}")]
pub struct UnknownDtype(pub String);

/// One mono PCM chunk, as produced by a synthesizer and consumed by the
/// playback ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPayload {
    /// Sample type of `data`.
    pub dtype: SampleDtype,
    /// Numpy-style shape; mono chunks carry a single dimension.
    pub shape: Vec<i32>,
    /// Raw little-endian sample bytes.
    pub data: Vec<u8>,
}

impl AudioPayload {
    /// Wrap a buffer of i16 samples.
    #[must_use]
    pub fn from_i16_samples(samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self {
            dtype: SampleDtype::Int16,
            shape: vec![i32::try_from(samples.len()).unwrap_or(i32::MAX)],
            data,
        }
    }

    /// Number of samples in this chunk, derived from the byte length.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.data.len() / self.dtype.sample_width()
    }

    /// Decode the payload into i16 samples regardless of dtype.
    ///
    /// Float samples are clamped to [-1.0, 1.0] and scaled; a trailing
    /// partial sample (malformed producer) is dropped.
    #[must_use]
    pub fn to_i16_samples(&self) -> Vec<i16> {
        match self.dtype {
            SampleDtype::Int16 => self
                .data
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
            SampleDtype::Float32 => self
                .data
                .chunks_exact(4)
                .map(|quad| {
                    let value = f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_round_trip() {
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN];
        let payload = AudioPayload::from_i16_samples(&samples);
        assert_eq!(payload.dtype, SampleDtype::Int16);
        assert_eq!(payload.shape, vec![5]);
        assert_eq!(payload.sample_count(), 5);
        assert_eq!(payload.to_i16_samples(), samples);
    }

    #[test]
    fn float_samples_are_scaled_and_clamped() {
        let mut data = Vec::new();
        for value in [0.0f32, 1.0, -1.0, 2.0] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        let payload = AudioPayload {
            dtype: SampleDtype::Float32,
            shape: vec![4],
            data,
        };
        let samples = payload.to_i16_samples();
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], i16::MAX);
        assert_eq!(samples[2], -i16::MAX);
        assert_eq!(samples[3], i16::MAX, "out-of-range floats are clamped");
    }

    #[test]
    fn dtype_labels_round_trip() {
        for dtype in [SampleDtype::Int16, SampleDtype::Float32] {
            assert_eq!(
                SampleDtype::from_wire_label(dtype.wire_label()).unwrap(),
                dtype
            );
        }
        assert!(SampleDtype::from_wire_label("int8").is_err());
    }
}
