//! Float to 16-bit PCM conversion.

use tracing::warn;

use crate::codec::DecodedBlock;

/// Result of one conversion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    /// Frames converted (per channel).
    pub frames: usize,
    /// At least one sample saturated.
    pub clipped: bool,
}

/// Converts planar float blocks into a fixed-capacity interleaved buffer.
#[derive(Debug)]
pub struct SampleConverter {
    buffer: Box<[i16]>,
    len: usize,
}

impl SampleConverter {
    /// `capacity` is the interleaved sample count of the output buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Convert as many leading frames of `block` as fit.
    ///
    /// The result of the pass is available from [`output`](Self::output)
    /// until the next call.
    pub fn convert(&mut self, block: &DecodedBlock<'_>) -> Conversion {
        let channels = block.channels();
        if channels == 0 {
            self.len = 0;
            return Conversion {
                frames: 0,
                clipped: false,
            };
        }

        let frames = block.frames().min(self.buffer.len() / channels);
        let mut clipped = false;
        for ch in 0..channels {
            let plane = &block.channel(ch)[..frames];
            for (i, &sample) in plane.iter().enumerate() {
                let (value, clip) = to_i16(sample);
                clipped |= clip;
                self.buffer[i * channels + ch] = value;
            }
        }
        self.len = frames * channels;

        if clipped {
            warn!("Clipping in {frames} frame block");
        }
        Conversion { frames, clipped }
    }

    /// Interleaved samples produced by the last pass.
    pub fn output(&self) -> &[i16] {
        &self.buffer[..self.len]
    }
}

/// Scale a float sample to 16 bits, rounding half up and saturating.
#[allow(clippy::cast_possible_truncation)]
pub fn to_i16(sample: f32) -> (i16, bool) {
    let value = (sample * 32767.0 + 0.5).floor();
    if value > f32::from(i16::MAX) {
        (i16::MAX, true)
    } else if value < f32::from(i16::MIN) {
        (i16::MIN, true)
    } else {
        (value as i16, false)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::codec::PlanarBuffer;
    use proptest::prelude::*;

    #[test]
    fn test_scaling_edges() {
        assert_eq!(to_i16(1.0), (32767, false));
        assert_eq!(to_i16(1.000_05), (32767, true));
        assert_eq!(to_i16(-1.0), (-32767, false));
        assert_eq!(to_i16(-1.5), (-32768, true));
        assert_eq!(to_i16(0.0), (0, false));
    }

    #[test]
    fn test_interleaves_channel_major() {
        let mut buffer = PlanarBuffer::new(2);
        buffer.extend_planes([&[0.0, 1.0, -1.0][..], &[0.5, -0.5, 0.25][..]]);

        let mut converter = SampleConverter::new(4096);
        let pass = converter.convert(&buffer.view().unwrap());
        assert_eq!(pass.frames, 3);
        assert!(!pass.clipped);
        assert_eq!(
            converter.output(),
            &[0, 16384, 32767, -16383, -32767, 8192]
        );
    }

    #[test]
    fn test_capacity_limits_pass() {
        let left = vec![0.1f32; 3000];
        let right = vec![-0.1f32; 3000];
        let mut buffer = PlanarBuffer::new(2);
        buffer.extend_planes([left.as_slice(), right.as_slice()]);

        let mut converter = SampleConverter::new(4096);
        let first = converter.convert(&buffer.view().unwrap());
        assert_eq!(first.frames, 2048);
        assert_eq!(converter.output().len(), 4096);

        buffer.consume(first.frames);
        let second = converter.convert(&buffer.view().unwrap());
        assert_eq!(second.frames, 952);
        assert_eq!(converter.output().len(), 1904);
    }

    proptest! {
        #[test]
        fn prop_conversion_is_deterministic(
            samples in proptest::collection::vec(-2.0f32..2.0, 1..600),
            capacity in 255usize..1024,
        ) {
            let mut buffer = PlanarBuffer::new(1);
            buffer.extend_planes([samples.as_slice()]);
            let block = buffer.view().unwrap();

            let mut a = SampleConverter::new(capacity);
            let mut b = SampleConverter::new(capacity);
            prop_assert_eq!(a.convert(&block), b.convert(&block));
            prop_assert_eq!(a.output(), b.output());

            let again = a.output().to_vec();
            a.convert(&block);
            prop_assert_eq!(a.output(), again.as_slice());
        }

        #[test]
        fn prop_output_tracks_input_sign(sample in -1.0f32..=1.0) {
            let (value, clipped) = to_i16(sample);
            prop_assert!(!clipped);
            if sample > 0.0001 {
                prop_assert!(value > 0);
            } else if sample < -0.0001 {
                prop_assert!(value < 0);
            }
        }
    }
}
