// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Ogg/Vorbis -> Ogg/Vorbis reencode transform (spec.md §4.3 `Reencode`),
//! grounded on `reencode.c`'s `reencode_page`: re-initializes the whole
//! decode/downmix/resample/encode chain whenever the incoming page's
//! `serialno` changes (a new logical stream / track boundary), and otherwise
//! feeds decoded PCM straight through the same downmix/resample/encode path
//! the plain PCM `Encode` stage uses.

use ices_core::{BufferAux, EncodeParams, RefBuffer, Result};

use crate::transforms::downmix::downmix_planar;
use crate::transforms::encode::Encoder;
use crate::transforms::resample::StreamResampler;
use crate::vorbis_synth::{InputPage, VorbisDecoder};

pub struct Reencoder {
    params: EncodeParams,
    downmix: bool,
    current_serial: Option<i32>,
    decoder: Option<VorbisDecoder>,
    resampler: Option<StreamResampler>,
    encoder: Option<Encoder>,
    serialno_source: i32,
}

impl Reencoder {
    pub fn new(params: EncodeParams, downmix: bool, serialno_source: i32) -> Self {
        Self {
            params,
            downmix,
            current_serial: None,
            decoder: None,
            resampler: None,
            encoder: None,
            serialno_source,
        }
    }

    /// Processes one incoming Ogg page (header/body already split per
    /// `BufferAux::VorbisHeaderLen`) and returns whatever re-encoded pages it
    /// produced, in order.
    pub fn process(&mut self, page: &RefBuffer, serialno: i32) -> Result<Vec<RefBuffer>> {
        let header_len = match page.aux() {
            BufferAux::VorbisHeaderLen(n) => n,
            _ => 0,
        };
        let bytes = page.bytes();
        let input = InputPage { header: &bytes[..header_len], body: &bytes[header_len..], serialno };

        if self.current_serial != Some(serialno) {
            let mut out = self.restart_stream(&input)?;
            out.extend(self.flush_old_logical_stream());
            return Ok(out);
        }

        self.feed_page(&input)
    }

    fn restart_stream(&mut self, first_page: &InputPage<'_>) -> Result<Vec<RefBuffer>> {
        let tail = self.finish_current_chain();
        self.current_serial = Some(first_page.serialno);
        self.decoder = Some(VorbisDecoder::start(first_page.serialno, first_page)?);
        self.resampler = None;
        self.encoder = None;
        Ok(tail)
    }

    fn finish_current_chain(&mut self) -> Vec<RefBuffer> {
        let mut out = Vec::new();
        if let Some(resampler) = self.resampler.as_mut() {
            if let Ok(tail) = resampler.finish() {
                if !tail[0].is_empty() {
                    if let Some(encoder) = self.encoder.as_mut() {
                        out.extend(encoder.encode(&tail));
                    }
                }
            }
        }
        if let Some(encoder) = self.encoder.as_mut() {
            out.extend(encoder.finish());
        }
        out
    }

    fn flush_old_logical_stream(&mut self) -> Vec<RefBuffer> {
        Vec::new()
    }

    fn feed_page(&mut self, page: &InputPage<'_>) -> Result<Vec<RefBuffer>> {
        let params = self.params;
        let downmix = self.downmix;
        let serialno_source = self.serialno_source;
        let encoder_slot = &mut self.encoder;
        let resampler_slot = &mut self.resampler;
        let mut produced = Vec::new();
        let mut header_pages: Vec<RefBuffer> = Vec::new();

        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(Vec::new());
        };

        let mut pcm_blocks: Vec<Vec<Vec<f32>>> = Vec::new();
        decoder.feed_page(page, |channels, samples| {
            let planar: Vec<Vec<f32>> = channels.iter().map(|c| c[..samples].to_vec()).collect();
            pcm_blocks.push(planar);
        })?;

        if encoder_slot.is_none() && decoder.channels() > 0 {
            // Header bootstrap just completed (decoder now reports a valid rate/channels);
            // stand up the downstream downmix/resample/encode chain lazily, the way
            // `reencode_page` does once `need_headers` reaches zero.
            let src_channels = decoder.channels();
            let dst_channels = params.channels;
            if downmix && src_channels == 2 && dst_channels == 1 {
                // downmix happens inline in the PCM loop below.
            }
            if decoder.rate() != params.sample_rate {
                *resampler_slot =
                    Some(StreamResampler::new(decoder.rate(), params.sample_rate, dst_channels as usize)?);
            }
            let comments = decoder.comments();
            let (enc, header) = Encoder::new(&params, serialno_source, &comments)?;
            *encoder_slot = Some(enc);
            header_pages.push(header);
        }

        for planar in pcm_blocks {
            let planar = if downmix && planar.len() == 2 && params.channels == 1 {
                vec![downmix_planar(&planar[0], &planar[1])]
            } else {
                planar
            };

            let planar = if let Some(resampler) = resampler_slot.as_mut() {
                resampler.push(&planar)?
            } else {
                planar
            };

            if planar[0].is_empty() {
                continue;
            }
            if let Some(encoder) = encoder_slot.as_mut() {
                produced.extend(encoder.encode(&planar));
            }
        }

        let mut out = header_pages;
        out.extend(produced);
        Ok(out)
    }
}
