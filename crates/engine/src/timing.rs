// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Wall-clock pacing derived from PCM byte-rate or Ogg granule positions
//! (spec.md §4.2 "Timing controller").
//!
//! The Ogg half of this module reparses the *first* BOS page's headers with
//! a transient libvorbis/libogg state purely to recover `samplerate` and the
//! zero-point `offset` correction described in spec.md §4.2 step 3 and its
//! accompanying rationale: the first audio packet's granulepos is the sample
//! index of its *last* sample, not its first.

use std::mem;
use std::time::{Duration, Instant};

use ogg_sys::{
    ogg_packet, ogg_page, ogg_page_granulepos, ogg_page_serialno, ogg_stream_clear, ogg_stream_init,
    ogg_stream_packetout, ogg_stream_pagein, ogg_stream_state,
};
use vorbis_sys::{
    vorbis_comment, vorbis_comment_clear, vorbis_comment_init, vorbis_info, vorbis_info_clear,
    vorbis_info_init, vorbis_packet_blocksize, vorbis_synthesis_headerin,
};

const CLOCK_SKEW_THRESHOLD_MS: i64 = 8_000;
const CLOCK_SKEW_SLEEP_MS: u64 = 5_000;

/// Long-lived libogg/libvorbis state for the header-recovery pass across the
/// BOS page and the pages that follow it, mirroring `VorbisDecoder`'s own
/// persistent `os`/`vi`/`vc` (`crates/engine/src/vorbis_synth.rs`): a real
/// stream splits its 3 header packets across multiple physical pages, so
/// this state must survive from the BOS page until header recovery
/// completes rather than being rebuilt (and zeroed) on every call.
struct StartPosState {
    os: ogg_stream_state,
    vi: vorbis_info,
    vc: vorbis_comment,
}

impl StartPosState {
    unsafe fn new(serialno: i32) -> Self {
        let mut os: ogg_stream_state = mem::zeroed();
        ogg_stream_init(&mut os, serialno);
        let mut vi: vorbis_info = mem::zeroed();
        let mut vc: vorbis_comment = mem::zeroed();
        vorbis_info_init(&mut vi);
        vorbis_comment_init(&mut vc);
        Self { os, vi, vc }
    }
}

impl Drop for StartPosState {
    fn drop(&mut self) {
        unsafe {
            vorbis_comment_clear(&mut self.vc);
            vorbis_info_clear(&mut self.vi);
            ogg_stream_clear(&mut self.os);
        }
    }
}

/// Shared pacing state for one producer run (spec.md §3 `TimingControl`).
pub struct TimingControl {
    starttime: Option<Instant>,
    senttime_us: u64,
    serialno: Option<i32>,
    samplerate: u32,
    oldsamples: i64,
    offset: i64,
    first_granulepos: i64,
    need_start_pos: bool,
    need_headers: u8,
    start_pos: Option<StartPosState>,
}

impl Default for TimingControl {
    fn default() -> Self {
        Self {
            starttime: None,
            senttime_us: 0,
            serialno: None,
            samplerate: 0,
            oldsamples: 0,
            offset: 0,
            first_granulepos: 0,
            need_start_pos: false,
            need_headers: 0,
            start_pos: None,
        }
    }
}

impl TimingControl {
    pub fn mark_start(&mut self) {
        if self.starttime.is_none() {
            self.starttime = Some(Instant::now());
        }
    }

    pub fn senttime_us(&self) -> u64 {
        self.senttime_us
    }

    /// PCM pacing entry point: advances `senttime` by `bytes * 1e6 / bytes_per_second`.
    pub fn advance_pcm(&mut self, bytes: usize, bytes_per_second: u32) {
        if bytes_per_second == 0 {
            return;
        }
        self.senttime_us += (bytes as u64 * 1_000_000) / u64::from(bytes_per_second);
    }

    /// Ogg pacing entry point (spec.md §4.2). `header` and `body` are the
    /// page's two spans, `is_bos` marks a beginning-of-stream page. Returns
    /// `Ok(())` normally, `Err(())` on a pacing-loss (spec.md §7).
    pub fn advance_ogg(&mut self, header: &[u8], body: &[u8]) -> Result<(), ()> {
        let mut og: ogg_page = unsafe { mem::zeroed() };
        og.header = header.as_ptr() as *mut u8;
        og.header_len = header.len() as libc::c_long;
        og.body = body.as_ptr() as *mut u8;
        og.body_len = body.len() as libc::c_long;

        let granulepos = unsafe { ogg_sys::ogg_page_granulepos(&mut og) };
        if granulepos < 0 {
            return Err(());
        }

        let serialno = unsafe { ogg_page_serialno(&mut og) };
        let is_bos = unsafe { ogg_sys::ogg_page_bos(&mut og) } != 0;

        if is_bos {
            self.serialno = Some(serialno);
            self.need_headers = 3;
            self.need_start_pos = true;
            self.oldsamples = 0;
            self.offset = 0;
            self.first_granulepos = 0;
            self.start_pos = Some(unsafe { StartPosState::new(serialno) });
        }

        if self.need_start_pos {
            return self.drive_start_pos(&mut og);
        }

        if self.serialno != Some(serialno) {
            return Err(());
        }

        let samples = granulepos - self.oldsamples;
        self.oldsamples = granulepos;
        if self.samplerate > 0 {
            self.senttime_us += ((samples.max(0) as u64) * 1_000_000) / u64::from(self.samplerate);
        }
        Ok(())
    }

    fn drive_start_pos(&mut self, og: &mut ogg_page) -> Result<(), ()> {
        let Some(state) = self.start_pos.as_mut() else {
            return Err(());
        };

        unsafe {
            ogg_stream_pagein(&mut state.os, og);

            let mut op: ogg_packet = mem::zeroed();
            let result = loop {
                if ogg_stream_packetout(&mut state.os, &mut op) <= 0 {
                    break Ok(());
                }

                if self.need_headers > 0 {
                    if vorbis_synthesis_headerin(&mut state.vi, &mut state.vc, &mut op) < 0 {
                        break Err(());
                    }
                    self.need_headers -= 1;
                    if self.need_headers == 0 {
                        self.samplerate = state.vi.rate as u32;
                        self.first_granulepos = 0;
                    }
                } else {
                    self.offset += i64::from(vorbis_packet_blocksize(&mut state.vi, &mut op)) / 4;
                    if self.first_granulepos == 0 && op.granulepos > 0 {
                        self.first_granulepos = op.granulepos;
                    }
                }
            };

            if result.is_err() {
                // Invalid header packet: drop the partially-built state so the
                // next BOS page starts clean rather than resuming into it.
                self.start_pos = None;
                return Err(());
            }

            let done = self.need_headers == 0 && self.first_granulepos != 0;
            if done {
                self.oldsamples = self.first_granulepos - self.offset;
                self.need_start_pos = false;
                self.start_pos = None;
            }

            Ok(())
        }
    }

    /// Computes how long to sleep to stay paced with `senttime`, applying
    /// the clock-skew heuristic from spec.md §4.2/§9.
    pub fn pacing_sleep(&self) -> Duration {
        let Some(starttime) = self.starttime else {
            return Duration::ZERO;
        };
        let elapsed_ms = starttime.elapsed().as_millis() as i64;
        let target_ms = (self.senttime_us / 1000) as i64;
        let sleep_ms = target_ms - elapsed_ms;

        if sleep_ms > CLOCK_SKEW_THRESHOLD_MS {
            tracing::warn!(sleep_ms, "pacing sleep exceeds clock-skew threshold, capping");
            Duration::from_millis(CLOCK_SKEW_SLEEP_MS)
        } else if sleep_ms > 0 {
            Duration::from_millis(sleep_ms as u64)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_pacing_advances_senttime_exactly() {
        let mut t = TimingControl::default();
        t.advance_pcm(352_800, 176_400);
        assert_eq!(t.senttime_us(), 2_000_000);
    }

    #[test]
    fn pacing_sleep_is_zero_before_start_marked() {
        let t = TimingControl::default();
        assert_eq!(t.pacing_sleep(), Duration::ZERO);
    }

    #[test]
    fn pacing_sleep_is_zero_once_behind_schedule() {
        let mut t = TimingControl::default();
        t.mark_start();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(t.pacing_sleep(), Duration::ZERO);
    }
}
