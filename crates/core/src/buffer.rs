// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The reference-counted payload that the producer fans out to every
//! instance queue.
//!
//! The original C source (`stream_shared.c`) hand-rolls an atomic refcount
//! guarded by a single mutex, freeing the blob's storage the moment the count
//! reaches zero. Rust already gives us that invariant for free via [`Arc`]:
//! `acquire` is a clone (bumps the strong count), `release` is a drop (the
//! backing `Bytes` is freed exactly once, when the last `Arc` goes out of
//! scope). There is no separate refcount mutex to get wrong.

use bytes::Bytes;
use std::sync::Arc;

/// The auxiliary scalar carried alongside a buffer's bytes.
///
/// For Vorbis input this is the length, in bytes, of any header data at the
/// front of the blob; for PCM input it is the stream's byte rate, used by the
/// timing controller to advance `senttime` without consulting the input
/// module again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAux {
    /// No auxiliary data attached.
    None,
    /// Byte offset of audio data following Vorbis headers embedded in this page.
    VorbisHeaderLen(usize),
    /// PCM byte rate (bytes/second) for pacing.
    PcmBytesPerSec(u32),
}

#[derive(Debug)]
struct RefBufferData {
    bytes: Bytes,
    /// Marks a logical-stream restart point (Ogg BOS page, track boundary).
    critical: bool,
    aux: BufferAux,
}

/// A shared, immutable byte blob carrying one unit of input.
///
/// Cloning is the `acquire` operation from spec.md §4.1; dropping the last
/// clone is `release`. `RefBuffer` is cheap to clone (one atomic increment)
/// and safe to hand to any number of instance queues concurrently.
#[derive(Debug, Clone)]
pub struct RefBuffer(Arc<RefBufferData>);

impl RefBuffer {
    /// Creates a new buffer with an initial reference count of one.
    pub fn new(bytes: Bytes, aux: BufferAux, critical: bool) -> Self {
        Self(Arc::new(RefBufferData { bytes, critical, aux }))
    }

    /// Raw bytes carried by this buffer.
    pub fn bytes(&self) -> &Bytes {
        &self.0.bytes
    }

    /// Number of bytes in this buffer.
    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    /// Whether this buffer carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// Whether this buffer marks a logical-stream restart point.
    pub fn is_critical(&self) -> bool {
        self.0.critical
    }

    /// The auxiliary scalar attached to this buffer.
    pub fn aux(&self) -> BufferAux {
        self.0.aux
    }

    /// Current number of live references to this buffer's storage.
    ///
    /// Exposed for tests asserting the fan-out invariant in spec.md §8; not
    /// meaningful to call concurrently with other acquire/release activity
    /// without external synchronization (the same caveat `Arc::strong_count`
    /// always carries).
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_has_single_reference() {
        let buf = RefBuffer::new(Bytes::from_static(b"abc"), BufferAux::None, false);
        assert_eq!(buf.ref_count(), 1);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_critical());
    }

    #[test]
    fn acquire_and_release_track_live_queue_references() {
        let buf = RefBuffer::new(Bytes::from_static(b"page"), BufferAux::VorbisHeaderLen(7), true);
        let a = buf.clone(); // acquire for queue A
        let b = buf.clone(); // acquire for queue B
        assert_eq!(buf.ref_count(), 3);
        assert_eq!(a.aux(), BufferAux::VorbisHeaderLen(7));
        assert!(a.is_critical());

        drop(a); // release from queue A
        assert_eq!(buf.ref_count(), 2);
        drop(b); // release from queue B
        assert_eq!(buf.ref_count(), 1);
    }

    #[test]
    fn pcm_aux_carries_byte_rate() {
        let buf = RefBuffer::new(Bytes::from_static(&[0u8; 4]), BufferAux::PcmBytesPerSec(176_400), false);
        assert_eq!(buf.aux(), BufferAux::PcmBytesPerSec(176_400));
    }
}
