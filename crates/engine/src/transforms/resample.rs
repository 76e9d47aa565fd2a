// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sample-rate conversion (spec.md §4.3 `Resample`), wrapping
//! `rubato::FastFixedIn` the way `AudioResamplerNode` does, but exposing the
//! `init`/`push`/`drain` contract the instance's transform chain needs
//! instead of a channel-driven node loop.

use ices_core::{IcesError, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

const CHUNK_FRAMES: usize = 1024;

/// Buffers interleaved input across calls and emits planar output in
/// `CHUNK_FRAMES`-sized blocks once enough input has accumulated.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    channels: usize,
    input_buffer: Vec<Vec<f32>>,
    fill: usize,
}

impl StreamResampler {
    pub fn new(in_hz: u32, out_hz: u32, channels: usize) -> Result<Self> {
        let ratio = f64::from(out_hz) / f64::from(in_hz);
        let resampler =
            FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Linear, CHUNK_FRAMES, channels)
                .map_err(|e| IcesError::Codec(format!("failed to create resampler: {e}")))?;

        Ok(Self {
            resampler,
            channels,
            input_buffer: vec![Vec::with_capacity(CHUNK_FRAMES * 2); channels],
            fill: 0,
        })
    }

    /// Appends one planar chunk of input (one `Vec<f32>` per channel, equal
    /// lengths) and returns every full `CHUNK_FRAMES` block of resampled
    /// planar output it now has enough input to produce.
    pub fn push(&mut self, planar_in: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        for (ch, src) in planar_in.iter().enumerate().take(self.channels) {
            self.input_buffer[ch].extend_from_slice(src);
        }
        self.fill = self.input_buffer[0].len();

        let mut out = vec![Vec::new(); self.channels];
        while self.fill >= CHUNK_FRAMES {
            let chunk: Vec<&[f32]> =
                self.input_buffer.iter().map(|b| &b[..CHUNK_FRAMES]).collect();
            let produced = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| IcesError::Codec(format!("resample failed: {e}")))?;
            for (ch, block) in produced.into_iter().enumerate() {
                out[ch].extend(block);
            }
            for buf in &mut self.input_buffer {
                buf.drain(..CHUNK_FRAMES);
            }
            self.fill -= CHUNK_FRAMES;
        }
        Ok(out)
    }

    /// Flushes whatever partial input remains (spec.md §4.6 shutdown drain,
    /// and `reencode`'s logical-stream-boundary flush), padding with silence
    /// if rubato requires a full chunk.
    pub fn finish(&mut self) -> Result<Vec<Vec<f32>>> {
        if self.fill == 0 {
            return Ok(vec![Vec::new(); self.channels]);
        }
        let pad_len = CHUNK_FRAMES - self.fill;
        let mut padded: Vec<Vec<f32>> = self
            .input_buffer
            .iter()
            .map(|b| {
                let mut v = b.clone();
                v.extend(std::iter::repeat(0.0).take(pad_len));
                v
            })
            .collect();
        let produced = self
            .resampler
            .process(&padded, None)
            .map_err(|e| IcesError::Codec(format!("resample flush failed: {e}")))?;
        for buf in &mut padded {
            buf.clear();
        }
        self.input_buffer = padded;
        self.fill = 0;
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_until_full_chunk_then_emits() {
        let mut r = StreamResampler::new(48_000, 44_100, 1).unwrap();
        let first = vec![vec![0.0_f32; 500]];
        let out = r.push(&first).unwrap();
        assert!(out[0].is_empty(), "should not emit before a full chunk accumulates");

        let second = vec![vec![0.0_f32; 600]];
        let out = r.push(&second).unwrap();
        assert!(!out[0].is_empty(), "should emit once enough input accumulated");
    }

    #[test]
    fn finish_flushes_partial_tail() {
        let mut r = StreamResampler::new(44_100, 48_000, 2).unwrap();
        r.push(&[vec![0.1_f32; 100], vec![0.1_f32; 100]]).unwrap();
        let out = r.finish().unwrap();
        assert!(!out[0].is_empty());
    }
}
