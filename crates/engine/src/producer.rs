// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The producer loop (spec.md §4.5): pulls chunks from the input module,
//! fans each one out to every live instance queue, and paces itself against
//! the shared [`TimingControl`].

use std::sync::atomic::Ordering;

use ices_core::InputEvent;
use tokio::sync::{mpsc, watch};

use crate::input::{GetData, InputModule};
use crate::instance::InstanceHandle;
use crate::timing::TimingControl;

/// Runs the producer loop until the input is exhausted or `shutdown` fires.
///
/// `instances` is the live set of destinations; entries whose `died` flag is
/// set are reaped (removed) at the top of each iteration (spec.md §4.5 step
/// 1). `events` carries out-of-band input events (metadata updates, forced
/// `NextTrack`) from the metadata side channel and the deadlock-avoidance
/// path below into the input module.
pub async fn run(
    mut input: Box<dyn InputModule>,
    mut instances: Vec<InstanceHandle>,
    mut events: mpsc::Receiver<InputEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timing = TimingControl::default();
    timing.mark_start();

    loop {
        instances.retain(|h| !h.flags.died.load(Ordering::SeqCst));

        if *shutdown.borrow() {
            break;
        }

        while let Ok(event) = events.try_recv() {
            if let Err(e) = input.handle_event(event).await {
                tracing::warn!(error = %e, "input event handling failed");
            }
        }

        let data = tokio::select! {
            data = input.get_data(&mut timing) => data,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        match data {
            GetData::Chunk(buf) => {
                fan_out(&instances, &buf);

                if !buf.is_critical() && all_waiting(&instances) {
                    // Deadlock avoidance (spec.md §4.5 step 5): every
                    // instance is waiting for a critical buffer but the
                    // input hasn't produced one (e.g. a stalled playlist
                    // entry); force the input to advance, then flush each
                    // waiting instance's queue (keeping critical buffers
                    // only) and clear its wait flag so it can resume once
                    // the forced advance produces a fresh critical buffer.
                    if let Err(e) = input.handle_event(InputEvent::NextTrack).await {
                        tracing::warn!(error = %e, "forced NextTrack failed");
                    }
                    for handle in &instances {
                        if handle.flags.wait_for_critical.load(Ordering::SeqCst) {
                            handle.queue.flush(true);
                            handle.flags.wait_for_critical.store(false, Ordering::SeqCst);
                        }
                    }
                }

                for handle in &instances {
                    handle.queue.notify();
                }
            },
            GetData::NoData => {},
            GetData::Fatal(reason) => {
                tracing::info!(reason, "input exhausted, producer shutting down");
                break;
            },
        }
    }

    for handle in &instances {
        handle.queue.notify();
    }
}

fn fan_out(instances: &[InstanceHandle], buf: &ices_core::RefBuffer) {
    for handle in instances {
        if handle.flags.skip.load(Ordering::SeqCst) {
            continue;
        }
        if handle.flags.wait_for_critical.load(Ordering::SeqCst) && !buf.is_critical() {
            continue;
        }
        handle.queue.enqueue(buf.clone());
    }
}

fn all_waiting(instances: &[InstanceHandle]) -> bool {
    !instances.is_empty()
        && instances
            .iter()
            .all(|h| h.flags.skip.load(Ordering::SeqCst) || h.flags.wait_for_critical.load(Ordering::SeqCst))
}

/// Spawns one tokio task per instance running [`crate::instance::run`], wired
/// to the same shutdown signal as the producer (spec.md §4.6).
pub fn spawn_instances(
    instances: &[InstanceHandle],
    input_kind: crate::input::InputKind,
    base_comments: ices_core::Comments,
    shutdown: &watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    instances
        .iter()
        .map(|handle| {
            let config = handle.config.clone();
            let queue = handle.queue.clone();
            let flags = handle.flags.clone();
            let kind = clone_input_kind(&input_kind);
            let comments = base_comments.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(crate::instance::run(config, queue, flags, kind, comments, shutdown))
        })
        .collect()
}

fn clone_input_kind(kind: &crate::input::InputKind) -> crate::input::InputKind {
    match kind {
        crate::input::InputKind::Pcm { subtype, channels, sample_rate } => {
            crate::input::InputKind::Pcm { subtype: *subtype, channels: *channels, sample_rate: *sample_rate }
        },
        crate::input::InputKind::Vorbis => crate::input::InputKind::Vorbis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceFlags;
    use bytes::Bytes;
    use ices_core::{BufferAux, InstanceConfig, RefBuffer};

    fn handle_with_flags(skip: bool, wait: bool) -> InstanceHandle {
        let h = InstanceHandle::new(InstanceConfig::default());
        h.flags.skip.store(skip, Ordering::SeqCst);
        h.flags.wait_for_critical.store(wait, Ordering::SeqCst);
        h
    }

    #[test]
    fn fan_out_skips_instances_flagged_skip() {
        let skip_handle = handle_with_flags(true, false);
        let normal_handle = handle_with_flags(false, false);
        let instances = vec![skip_handle, normal_handle];
        let buf = RefBuffer::new(Bytes::from_static(b"x"), BufferAux::None, false);
        fan_out(&instances, &buf);
        assert!(instances[0].queue.is_empty());
        assert_eq!(instances[1].queue.len(), 1);
    }

    #[test]
    fn fan_out_withholds_noncritical_from_waiting_instances() {
        let waiting = handle_with_flags(false, true);
        let instances = vec![waiting];
        let noncritical = RefBuffer::new(Bytes::from_static(b"x"), BufferAux::None, false);
        fan_out(&instances, &noncritical);
        assert!(instances[0].queue.is_empty());

        let critical = RefBuffer::new(Bytes::from_static(b"x"), BufferAux::None, true);
        fan_out(&instances, &critical);
        assert_eq!(instances[0].queue.len(), 1);
    }

    #[test]
    fn all_waiting_true_only_when_every_live_instance_is_stalled() {
        let a = handle_with_flags(false, true);
        let b = handle_with_flags(true, false);
        assert!(all_waiting(&[a, b]));

        let c = handle_with_flags(false, false);
        let d = handle_with_flags(false, true);
        assert!(!all_waiting(&[c, d]));
    }
}
