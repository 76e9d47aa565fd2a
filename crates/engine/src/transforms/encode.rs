// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PCM -> Vorbis encode transform (spec.md §4.3 `Encode`), grounded on the
//! call sequence in `encode.c`'s `encode_initialise`/`encode_data_float`/
//! `encode_dataout`/`encode_finish`.

use bytes::Bytes;
use ices_core::{BufferAux, Comments, EncodeParams, RefBuffer, Result};

use crate::transforms::downmix::downmix_planar;
use crate::transforms::resample::StreamResampler;
use crate::vorbis_ffi::VorbisEncoder;

/// Drives one logical Vorbis stream's worth of PCM -> Ogg/Vorbis encoding.
pub struct Encoder {
    inner: VorbisEncoder,
}

impl Encoder {
    /// Builds a fresh encoder and returns the header page(s) as a single
    /// critical `RefBuffer` ready to enqueue ahead of audio data.
    pub fn new(params: &EncodeParams, serialno: i32, comments: &Comments) -> Result<(Self, RefBuffer)> {
        let (inner, header_pages) = VorbisEncoder::new(
            params.channels,
            params.sample_rate,
            params.bitrate_mode(),
            params.effective_max_samples_ppage(),
            serialno,
            comments,
        )?;

        let mut bytes = Vec::new();
        let mut header_len = 0usize;
        for page in header_pages {
            header_len += page.bytes.len();
            bytes.extend_from_slice(&page.bytes);
        }
        let header_buf = RefBuffer::new(Bytes::from(bytes), BufferAux::VorbisHeaderLen(header_len), true);
        Ok((Self { inner }, header_buf))
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels()
    }

    pub fn samplerate(&self) -> u32 {
        self.inner.samplerate()
    }

    /// Submits one block of planar float PCM and drains whatever pages that
    /// produces into queue-ready buffers.
    pub fn encode(&mut self, planar: &[Vec<f32>]) -> Vec<RefBuffer> {
        self.inner.submit(planar);
        self.drain()
    }

    fn drain(&mut self) -> Vec<RefBuffer> {
        self.inner
            .drain()
            .into_iter()
            .map(|p| RefBuffer::new(Bytes::from(p.bytes), BufferAux::None, false))
            .collect()
    }

    /// Finishes the logical stream, returning its trailing pages.
    pub fn finish(&mut self) -> Vec<RefBuffer> {
        self.inner
            .finish()
            .into_iter()
            .map(|p| RefBuffer::new(Bytes::from(p.bytes), BufferAux::None, p.eos))
            .collect()
    }
}

/// Full PCM -> Vorbis chain for one instance (spec.md §4.3 `Downmix` ->
/// `Resample` -> `Encode`), driven by the instance's `process_and_send` loop
/// the way [`crate::transforms::reencode::Reencoder`] drives its own chain
/// for Vorbis input.
pub struct EncodeChain {
    params: EncodeParams,
    downmix: bool,
    src_channels: u16,
    src_rate: u32,
    resampler: Option<StreamResampler>,
    encoder: Encoder,
}

impl EncodeChain {
    /// Builds the chain and returns its Vorbis header page(s), ready to
    /// enqueue ahead of audio data.
    pub fn new(
        params: EncodeParams,
        downmix: bool,
        src_channels: u16,
        src_rate: u32,
        serialno: i32,
        comments: &Comments,
    ) -> Result<(Self, RefBuffer)> {
        let resampler = Self::build_resampler(&params, src_rate)?;
        let (encoder, header) = Encoder::new(&params, serialno, comments)?;
        Ok((Self { params, downmix, src_channels, src_rate, resampler, encoder }, header))
    }

    fn build_resampler(params: &EncodeParams, src_rate: u32) -> Result<Option<StreamResampler>> {
        if src_rate == params.sample_rate {
            return Ok(None);
        }
        Ok(Some(StreamResampler::new(src_rate, params.sample_rate, params.channels as usize)?))
    }

    /// Submits one block of interleaved 16-bit little-endian PCM, applying
    /// downmix and resample ahead of the encoder per spec.md §4.3's
    /// `Downmix` -> `Resample` -> `Encode` ordering.
    pub fn process(&mut self, pcm: &[u8]) -> Result<Vec<RefBuffer>> {
        let mut planar = planar_from_pcm16le(pcm, self.src_channels);
        if self.downmix && planar.len() == 2 && self.params.channels == 1 {
            planar = vec![downmix_planar(&planar[0], &planar[1])];
        }
        let planar = match self.resampler.as_mut() {
            Some(resampler) => resampler.push(&planar)?,
            None => planar,
        };
        if planar.is_empty() || planar[0].is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.encoder.encode(&planar))
    }

    /// Finishes the current logical stream, flushing any resampler tail
    /// through the encoder first.
    pub fn finish(&mut self) -> Vec<RefBuffer> {
        let mut out = Vec::new();
        if let Some(resampler) = self.resampler.as_mut() {
            if let Ok(tail) = resampler.finish() {
                if !tail[0].is_empty() {
                    out.extend(self.encoder.encode(&tail));
                }
            }
        }
        out.extend(self.encoder.finish());
        out
    }

    /// Finishes the current logical stream and starts a fresh one under a
    /// new serial number (spec.md §4.6/§4.7: a critical buffer marks a new
    /// logical stream, e.g. after a reconnect), returning the outgoing
    /// pages of the old stream and the header page of the new one.
    pub fn restart(&mut self, serialno: i32, comments: &Comments) -> Result<(Vec<RefBuffer>, RefBuffer)> {
        let tail = self.finish();
        let resampler = Self::build_resampler(&self.params, self.src_rate)?;
        let (encoder, header) = Encoder::new(&self.params, serialno, comments)?;
        self.resampler = resampler;
        self.encoder = encoder;
        Ok((tail, header))
    }
}

/// Converts interleaved 16-bit little-endian PCM into planar `f32` samples
/// in `[-1.0, 1.0]`, one `Vec<f32>` per channel.
fn planar_from_pcm16le(bytes: &[u8], channels: u16) -> Vec<Vec<f32>> {
    let channels = usize::from(channels).max(1);
    let samples: Vec<f32> =
        bytes.chunks_exact(2).map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32768.0).collect();
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for chunk in samples.chunks_exact(channels) {
        for (ch, v) in chunk.iter().enumerate() {
            planar[ch].push(*v);
        }
    }
    planar
}
