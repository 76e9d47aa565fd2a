// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Thin safe wrapper around `vorbis-sys` / `vorbisenc-sys` / `ogg-sys`.
//!
//! This mirrors the call sequence in the original `encode.c`/`reencode.c`
//! (`vorbis_info_init` -> `vorbis_encode_init[_vbr]` -> `vorbis_analysis_init`
//! -> `vorbis_block_init` -> `ogg_stream_init` -> header packets -> the
//! analysis/bitrate/pageout loop) and the equivalent real-world Rust usage in
//! `vorbis-enc`'s `OggVorbisEncoder`. All `unsafe` in this crate is confined
//! to this module and [`crate::vorbis_synth`].

use std::mem;
use std::os::raw::c_int;

use ices_core::{Comments, IcesError, Result};
use ogg_sys::{
    ogg_packet, ogg_page, ogg_stream_clear, ogg_stream_flush, ogg_stream_init, ogg_stream_packetin,
    ogg_stream_pageout, ogg_stream_state,
};
use vorbis_sys::{
    vorbis_analysis, vorbis_analysis_blockout, vorbis_analysis_buffer, vorbis_analysis_headerout,
    vorbis_analysis_init, vorbis_analysis_wrote, vorbis_bitrate_addblock, vorbis_bitrate_flushpacket,
    vorbis_block, vorbis_block_clear, vorbis_block_init, vorbis_comment, vorbis_comment_add_tag,
    vorbis_comment_clear, vorbis_comment_init, vorbis_dsp_clear, vorbis_dsp_state, vorbis_info,
    vorbis_info_clear, vorbis_info_init,
};
use vorbisenc_sys::{vorbis_encode_init, vorbis_encode_init_vbr, vorbis_encode_setup_managed};

use crate::BitrateMode;

fn cstring(s: &str) -> std::ffi::CString {
    // Vorbis comment keys/values are never supplied with embedded NULs in practice;
    // fall back to truncating at the first one rather than panicking on bad input.
    std::ffi::CString::new(s).unwrap_or_else(|e| {
        let pos = e.nul_position();
        std::ffi::CString::new(&e.into_vec()[..pos]).unwrap_or_default()
    })
}

/// One produced Ogg page's raw bytes, plus the granule position libogg assigned it.
pub struct EncodedPage {
    pub bytes: Vec<u8>,
    pub granulepos: i64,
    pub eos: bool,
}

unsafe fn page_bytes(og: &ogg_page) -> Vec<u8> {
    let header = std::slice::from_raw_parts(og.header, og.header_len as usize);
    let body = std::slice::from_raw_parts(og.body, og.body_len as usize);
    let mut v = Vec::with_capacity(header.len() + body.len());
    v.extend_from_slice(header);
    v.extend_from_slice(body);
    v
}

/// Owns the libvorbis analysis state and a libogg logical stream for one
/// encode session (one instance's lifetime, or one reencode logical stream).
pub struct VorbisEncoder {
    vi: vorbis_info,
    vc: vorbis_comment,
    vd: vorbis_dsp_state,
    vb: vorbis_block,
    os: ogg_stream_state,
    channels: u16,
    samplerate: u32,
    max_samples_ppage: u32,
    samples_in_current_page: u32,
    header_flushed: bool,
}

impl VorbisEncoder {
    /// Initializes a fresh encoder, writing the three Vorbis header packets
    /// into a brand-new logical stream and returning the header page(s).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channels: u16,
        samplerate: u32,
        mode: BitrateMode,
        max_samples_ppage: u32,
        serialno: i32,
        comments: &Comments,
    ) -> Result<(Self, Vec<EncodedPage>)> {
        unsafe {
            let mut vi: vorbis_info = mem::zeroed();
            vorbis_info_init(&mut vi);

            let ret = match mode {
                BitrateMode::Vbr { quality } => {
                    vorbis_encode_init_vbr(&mut vi, i64::from(channels), i64::from(samplerate), quality / 10.0)
                },
                BitrateMode::Abr { nominal } => vorbis_encode_init(
                    &mut vi,
                    i64::from(channels),
                    i64::from(samplerate),
                    -1,
                    i64::from(nominal),
                    -1,
                ),
                BitrateMode::Managed { min, nominal, max } => {
                    let r = vorbis_encode_init(
                        &mut vi,
                        i64::from(channels),
                        i64::from(samplerate),
                        max.map_or(-1, i64::from),
                        nominal.map_or(-1, i64::from),
                        min.map_or(-1, i64::from),
                    );
                    if r == 0 {
                        // Re-assert managed mode explicitly; `vorbis_encode_init` with a
                        // partial triple may otherwise fall back to an unmanaged average.
                        let mut managed: c_int = 1;
                        vorbis_encode_setup_managed(
                            &mut vi,
                            i64::from(channels),
                            i64::from(samplerate),
                            max.map_or(-1, i64::from),
                            nominal.map_or(-1, i64::from),
                            min.map_or(-1, i64::from),
                        );
                        let _ = &mut managed;
                    }
                    r
                },
            };

            if ret != 0 {
                vorbis_info_clear(&mut vi);
                return Err(IcesError::Codec(format!(
                    "vorbis_encode_init failed with code {ret}"
                )));
            }

            let mut vc: vorbis_comment = mem::zeroed();
            vorbis_comment_init(&mut vc);
            for (key, value) in comments.iter() {
                let k = cstring(key);
                let v = cstring(value);
                vorbis_comment_add_tag(&mut vc, k.as_ptr(), v.as_ptr());
            }

            let mut vd: vorbis_dsp_state = mem::zeroed();
            vorbis_analysis_init(&mut vd, &mut vi);
            let mut vb: vorbis_block = mem::zeroed();
            vorbis_block_init(&mut vd, &mut vb);

            let mut os: ogg_stream_state = mem::zeroed();
            ogg_stream_init(&mut os, serialno);

            let mut header: ogg_packet = mem::zeroed();
            let mut header_comm: ogg_packet = mem::zeroed();
            let mut header_code: ogg_packet = mem::zeroed();
            vorbis_analysis_headerout(&mut vd, &mut vc, &mut header, &mut header_comm, &mut header_code);
            ogg_stream_packetin(&mut os, &mut header);
            ogg_stream_packetin(&mut os, &mut header_comm);
            ogg_stream_packetin(&mut os, &mut header_code);

            let mut enc = Self {
                vi,
                vc,
                vd,
                vb,
                os,
                channels,
                samplerate,
                max_samples_ppage: max_samples_ppage.max(1),
                samples_in_current_page: 0,
                header_flushed: false,
            };

            let mut pages = Vec::new();
            let mut og: ogg_page = mem::zeroed();
            while ogg_stream_flush(&mut enc.os, &mut og) != 0 {
                pages.push(EncodedPage { bytes: page_bytes(&og), granulepos: 0, eos: false });
            }
            enc.header_flushed = true;

            Ok((enc, pages))
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    /// Submits planar float PCM (one `Vec<f32>` per channel, all equal length)
    /// to the analysis buffer, per spec.md §4.3 `Encode`.
    pub fn submit(&mut self, planar: &[Vec<f32>]) {
        if planar.is_empty() {
            return;
        }
        let samples = planar[0].len();
        unsafe {
            let buffers = vorbis_analysis_buffer(&mut self.vd, samples as c_int);
            let channel_ptrs = std::slice::from_raw_parts(buffers, self.channels as usize);
            for (ch, src) in planar.iter().enumerate().take(self.channels as usize) {
                let dst = std::slice::from_raw_parts_mut(channel_ptrs[ch], samples);
                dst[..src.len()].copy_from_slice(src);
            }
            vorbis_analysis_wrote(&mut self.vd, samples as c_int);
        }
        self.samples_in_current_page += samples as u32;
    }

    /// Signals end-of-stream to the analysis layer (spec.md §4.3 `Encode` EOS handling).
    pub fn signal_eos(&mut self) {
        unsafe {
            vorbis_analysis_wrote(&mut self.vd, 0);
        }
    }

    /// Drains every packet the analysis layer is currently willing to produce,
    /// force-flushing the current page once it grows past `max_samples_ppage`
    /// (spec.md §4.3's configurable analogue to the original's hardcoded
    /// `samplerate * 2` threshold).
    pub fn drain(&mut self) -> Vec<EncodedPage> {
        let mut pages = Vec::new();
        unsafe {
            while vorbis_analysis_blockout(&mut self.vd, &mut self.vb) == 1 {
                vorbis_analysis(&mut self.vb, std::ptr::null_mut());
                vorbis_bitrate_addblock(&mut self.vb);

                let mut op: ogg_packet = mem::zeroed();
                while vorbis_bitrate_flushpacket(&mut self.vd, &mut op) != 0 {
                    ogg_stream_packetin(&mut self.os, &mut op);

                    if self.samples_in_current_page > self.max_samples_ppage {
                        self.flush_into(&mut pages);
                    } else {
                        self.pageout_into(&mut pages);
                    }
                }
            }
        }
        pages
    }

    /// Finishes analysis and flushes every remaining page, including a final
    /// forced `ogg_stream_flush` for whatever is left (spec.md §4.6 shutdown drain).
    pub fn finish(&mut self) -> Vec<EncodedPage> {
        self.signal_eos();
        let mut pages = self.drain();
        unsafe {
            let mut og: ogg_page = mem::zeroed();
            while ogg_stream_flush(&mut self.os, &mut og) != 0 {
                let eos = ogg_sys::ogg_page_eos(&mut og) != 0;
                pages.push(EncodedPage { bytes: page_bytes(&og), granulepos: 0, eos });
            }
        }
        pages
    }

    unsafe fn pageout_into(&mut self, pages: &mut Vec<EncodedPage>) {
        let mut og: ogg_page = mem::zeroed();
        while ogg_stream_pageout(&mut self.os, &mut og) != 0 {
            let gp = ogg_sys::ogg_page_granulepos(&mut og);
            let eos = ogg_sys::ogg_page_eos(&mut og) != 0;
            pages.push(EncodedPage { bytes: page_bytes(&og), granulepos: gp, eos });
            self.samples_in_current_page = 0;
        }
    }

    unsafe fn flush_into(&mut self, pages: &mut Vec<EncodedPage>) {
        let mut og: ogg_page = mem::zeroed();
        while ogg_stream_flush(&mut self.os, &mut og) != 0 {
            let gp = ogg_sys::ogg_page_granulepos(&mut og);
            let eos = ogg_sys::ogg_page_eos(&mut og) != 0;
            pages.push(EncodedPage { bytes: page_bytes(&og), granulepos: gp, eos });
            self.samples_in_current_page = 0;
        }
    }
}

impl Drop for VorbisEncoder {
    fn drop(&mut self) {
        unsafe {
            ogg_stream_clear(&mut self.os);
            vorbis_block_clear(&mut self.vb);
            vorbis_dsp_clear(&mut self.vd);
            vorbis_comment_clear(&mut self.vc);
            vorbis_info_clear(&mut self.vi);
        }
    }
}

// SAFETY: a `VorbisEncoder` is only ever driven from the single task that owns
// its instance; libvorbis/libogg keep no global mutable state shared across
// independent `vorbis_info`/`ogg_stream_state` instances.
unsafe impl Send for VorbisEncoder {}
