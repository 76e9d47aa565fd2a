// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Vorbis *decode*-side FFI, used only by the reencode transform (spec.md
//! §4.3 `Reencode`) to pull PCM back out of an already-Ogg-framed input so it
//! can be re-submitted to a [`crate::vorbis_ffi::VorbisEncoder`] at a
//! different bitrate. Mirrors `reencode.c`'s use of
//! `vorbis_synthesis_headerin`/`vorbis_synthesis`/`vorbis_synthesis_pcmout`.

use std::mem;
use std::os::raw::c_int;

use ices_core::{IcesError, Result};
use ogg_sys::{
    ogg_packet, ogg_page, ogg_stream_clear, ogg_stream_init, ogg_stream_packetout, ogg_stream_pagein,
    ogg_stream_state,
};
use vorbis_sys::{
    vorbis_block, vorbis_block_clear, vorbis_block_init, vorbis_comment, vorbis_comment_clear,
    vorbis_comment_init, vorbis_dsp_clear, vorbis_dsp_state, vorbis_info, vorbis_info_clear,
    vorbis_info_init, vorbis_synthesis, vorbis_synthesis_blockin, vorbis_synthesis_headerin,
    vorbis_synthesis_init, vorbis_synthesis_pcmout, vorbis_synthesis_read,
};

/// A page of Ogg-framed Vorbis, split into header and body spans the way
/// `RefBuffer`'s `BufferAux::VorbisHeaderLen` records it.
pub struct InputPage<'a> {
    pub header: &'a [u8],
    pub body: &'a [u8],
    pub serialno: i32,
}

/// Demuxes one logical Vorbis stream's packets back into PCM. Lives for the
/// lifetime of one logical stream (one `serialno`); `reencode`'s instance
/// state reinitializes this whenever the incoming serial number changes.
pub struct VorbisDecoder {
    vi: vorbis_info,
    vc: vorbis_comment,
    vd: vorbis_dsp_state,
    vb: vorbis_block,
    os: ogg_stream_state,
    headers_needed: u8,
    synthesis_ready: bool,
}

impl VorbisDecoder {
    /// Starts a fresh logical stream and feeds it one page; the first packet
    /// on the page must be the Vorbis identification header.
    pub fn start(serialno: i32, first_page: &InputPage<'_>) -> Result<Self> {
        unsafe {
            let mut os: ogg_stream_state = mem::zeroed();
            ogg_stream_init(&mut os, serialno);
            page_in(&mut os, first_page);

            let mut vi: vorbis_info = mem::zeroed();
            vorbis_info_init(&mut vi);
            let mut vc: vorbis_comment = mem::zeroed();
            vorbis_comment_init(&mut vc);

            let mut op: ogg_packet = mem::zeroed();
            if ogg_stream_packetout(&mut os, &mut op) != 1 {
                vorbis_info_clear(&mut vi);
                vorbis_comment_clear(&mut vc);
                ogg_stream_clear(&mut os);
                return Err(IcesError::Codec("invalid primary header in reencode input".into()));
            }
            if vorbis_synthesis_headerin(&mut vi, &mut vc, &mut op) < 0 {
                vorbis_info_clear(&mut vi);
                vorbis_comment_clear(&mut vc);
                ogg_stream_clear(&mut os);
                return Err(IcesError::Codec("reencode input is not vorbis".into()));
            }

            Ok(Self {
                vi,
                vc,
                vd: mem::zeroed(),
                vb: mem::zeroed(),
                os,
                headers_needed: 2,
                synthesis_ready: false,
            })
        }
    }

    pub fn channels(&self) -> u16 {
        self.vi.channels as u16
    }

    pub fn rate(&self) -> u32 {
        self.vi.rate as u32
    }

    pub fn comments(&self) -> ices_core::Comments {
        let mut c = ices_core::Comments::new();
        unsafe {
            let count = self.vc.comments as usize;
            let lens = std::slice::from_raw_parts(self.vc.comment_lengths, count);
            let ptrs = std::slice::from_raw_parts(self.vc.user_comments, count);
            for i in 0..count {
                let bytes = std::slice::from_raw_parts(ptrs[i] as *const u8, lens[i] as usize);
                if let Ok(s) = std::str::from_utf8(bytes) {
                    if let Some((k, v)) = s.split_once('=') {
                        c.add(k, v);
                    }
                }
            }
        }
        c
    }

    /// Feeds one more page into the demuxer and pulls every PCM block it
    /// yields, in order, via `on_pcm`. Completes header bootstrap internally
    /// the first two times it is called after `start`.
    pub fn feed_page(&mut self, page: &InputPage<'_>, mut on_pcm: impl FnMut(&[&[f32]], usize)) -> Result<()> {
        unsafe {
            page_in(&mut self.os, page);
            let mut op: ogg_packet = mem::zeroed();
            while ogg_stream_packetout(&mut self.os, &mut op) > 0 {
                if self.headers_needed > 0 {
                    if vorbis_synthesis_headerin(&mut self.vi, &mut self.vc, &mut op) < 0 {
                        return Err(IcesError::Codec("invalid comment/setup header in reencode input".into()));
                    }
                    self.headers_needed -= 1;
                    if self.headers_needed == 0 {
                        vorbis_block_init(&mut self.vd, &mut self.vb);
                        vorbis_synthesis_init(&mut self.vd, &mut self.vi);
                        self.synthesis_ready = true;
                    }
                    continue;
                }

                if vorbis_synthesis(&mut self.vb, &mut op) == 0 {
                    vorbis_synthesis_blockin(&mut self.vd, &mut self.vb);
                }

                loop {
                    let mut pcm: *mut *mut f32 = std::ptr::null_mut();
                    let samples = vorbis_synthesis_pcmout(&mut self.vd, &mut pcm);
                    if samples <= 0 {
                        break;
                    }
                    let channels = self.vi.channels as usize;
                    let chan_ptrs = std::slice::from_raw_parts(pcm, channels);
                    let views: Vec<&[f32]> = chan_ptrs
                        .iter()
                        .map(|p| std::slice::from_raw_parts(*p, samples as usize))
                        .collect();
                    on_pcm(&views, samples as usize);
                    vorbis_synthesis_read(&mut self.vd, samples as c_int);
                }
            }
        }
        Ok(())
    }
}

unsafe fn page_in(os: &mut ogg_stream_state, page: &InputPage<'_>) {
    let mut og: ogg_page = mem::zeroed();
    og.header = page.header.as_ptr() as *mut u8;
    og.header_len = page.header.len() as libc::c_long;
    og.body = page.body.as_ptr() as *mut u8;
    og.body_len = page.body.len() as libc::c_long;
    ogg_stream_pagein(os, &mut og);
}

impl Drop for VorbisDecoder {
    fn drop(&mut self) {
        unsafe {
            if self.synthesis_ready {
                vorbis_block_clear(&mut self.vb);
                vorbis_dsp_clear(&mut self.vd);
            }
            vorbis_comment_clear(&mut self.vc);
            vorbis_info_clear(&mut self.vi);
            ogg_stream_clear(&mut self.os);
        }
    }
}

unsafe impl Send for VorbisDecoder {}
