// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Instance streamer: connection lifecycle, reconnect state machine, and
//! `process_and_send` (spec.md §4.6, §4.7).

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use ices_core::{Comments, InstanceConfig, RefBuffer};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use crate::input::InputKind;
use crate::queue::InstanceQueue;
use crate::serial;
use crate::shout_client::{AudioInfo, SendError, ShoutClient};
use crate::transforms::encode::EncodeChain;
use crate::transforms::reencode::Reencoder;

/// What kind of per-instance processing chain is wired up, chosen at
/// startup from the input's kind and the instance's `encode` parameters
/// (spec.md §4.6 Startup).
enum Chain {
    Passthrough,
    Encode(Box<EncodeChain>),
    Reencode(Box<Reencoder>),
}

/// Shared, cross-task flags for one instance (spec.md §3 "runtime flags").
pub struct InstanceFlags {
    pub died: AtomicBool,
    pub skip: AtomicBool,
    pub wait_for_critical: AtomicBool,
    pub buffer_failures: AtomicI32,
}

impl Default for InstanceFlags {
    fn default() -> Self {
        Self {
            died: AtomicBool::new(false),
            skip: AtomicBool::new(false),
            wait_for_critical: AtomicBool::new(false),
            buffer_failures: AtomicI32::new(0),
        }
    }
}

pub struct InstanceHandle {
    pub config: InstanceConfig,
    pub queue: Arc<InstanceQueue>,
    pub flags: Arc<InstanceFlags>,
}

impl InstanceHandle {
    pub fn new(config: InstanceConfig) -> Self {
        let queue = Arc::new(InstanceQueue::new(config.max_queue_length));
        Self { config, queue, flags: Arc::new(InstanceFlags::default()) }
    }
}

/// Outcome of `process_and_send` (spec.md §4.7).
enum SendOutcome {
    Success,
    NoData,
    TransformFatal,
    SendFailed,
}

struct RunningInstance {
    config: InstanceConfig,
    queue: Arc<InstanceQueue>,
    flags: Arc<InstanceFlags>,
    client: Option<ShoutClient>,
    chain: Chain,
    savefile: Option<tokio::fs::File>,
    pending_header: Option<RefBuffer>,
    comments: Comments,
}

/// Reads the serial number out of a raw Ogg page header (bytes 14..18,
/// little-endian), per the Ogg page-header layout.
fn page_serialno(header: &[u8]) -> i32 {
    header.get(14..18).map_or(0, |b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Runs one instance for its whole lifetime: connect, stream, reconnect on
/// error, exit on `died` (spec.md §4.6). Intended to be spawned as its own
/// tokio task per instance.
pub async fn run(
    config: InstanceConfig,
    queue: Arc<InstanceQueue>,
    flags: Arc<InstanceFlags>,
    input_kind: InputKind,
    base_comments: Comments,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut savefile = None;
    if let Some(path) = &config.savefile {
        savefile = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await.ok();
    }

    let mut pending_header = None;
    let chain = match (&input_kind, &config.encode) {
        (InputKind::Pcm { channels, sample_rate, .. }, Some(params)) => match EncodeChain::new(
            *params,
            config.downmix,
            *channels,
            *sample_rate,
            serial::next_serial(),
            &base_comments,
        ) {
            Ok((chain, header)) => {
                pending_header = Some(header);
                Chain::Encode(Box::new(chain))
            },
            Err(e) => {
                tracing::error!(instance = %config.name, error = %e, "encoder init failed");
                flags.died.store(true, Ordering::SeqCst);
                return;
            },
        },
        (InputKind::Vorbis, Some(params)) => {
            Chain::Reencode(Box::new(Reencoder::new(*params, config.downmix, serial::next_serial())))
        },
        _ => Chain::Passthrough,
    };

    let mut inst = RunningInstance {
        config: config.clone(),
        queue: queue.clone(),
        flags: flags.clone(),
        comments: base_comments,
        client: None,
        chain,
        savefile,
        pending_header,
    };

    if !connect_with_retry(&mut inst, &mut shutdown, config.retry.retry_initial_connection).await {
        flags.died.store(true, Ordering::SeqCst);
        return;
    }

    loop {
        if flags.buffer_failures.load(Ordering::SeqCst) > 10 {
            tracing::warn!(instance = %config.name, "buffer_failures exceeded, instance exiting");
            break;
        }

        tokio::select! {
            () = queue.wait_for_data() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }

        if flags.died.load(Ordering::SeqCst) {
            break;
        }

        let Some(buf) = queue.dequeue() else {
            flags.buffer_failures.fetch_add(1, Ordering::SeqCst);
            continue;
        };
        if buf.is_empty() {
            flags.buffer_failures.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        if flags.wait_for_critical.load(Ordering::SeqCst) && buf.is_critical() {
            tracing::info!(instance = %inst.config.name, "restarting on new substream");
            flags.wait_for_critical.store(false, Ordering::SeqCst);
        }

        match process_and_send(&mut inst, &buf).await {
            SendOutcome::Success => {
                let prev = flags.buffer_failures.load(Ordering::SeqCst);
                if prev > 0 {
                    flags.buffer_failures.store(prev - 1, Ordering::SeqCst);
                }
            },
            SendOutcome::NoData => {},
            SendOutcome::TransformFatal => {
                flags.wait_for_critical.store(true, Ordering::SeqCst);
                queue.flush(true);
            },
            SendOutcome::SendFailed => {
                flags.skip.store(true, Ordering::SeqCst);
                queue.flush(true);
                inst.client = None;
                if connect_with_retry(&mut inst, &mut shutdown, true).await {
                    flags.skip.store(false, Ordering::SeqCst);
                    flags.wait_for_critical.store(true, Ordering::SeqCst);
                    queue.flush(true);
                } else {
                    flags.buffer_failures.store(11, Ordering::SeqCst);
                }
            },
        }
    }

    flags.died.store(true, Ordering::SeqCst);
}

async fn connect_with_retry(
    inst: &mut RunningInstance,
    shutdown: &mut watch::Receiver<bool>,
    retry_initial: bool,
) -> bool {
    let mut attempt = 0i32;
    loop {
        attempt += 1;
        let audio_info = AudioInfo {
            bitrate: inst.config.encode.and_then(|e| non_negative(e.nominal_bitrate)),
            quality: inst.config.encode.map(|e| e.quality),
            channels: inst.config.encode.map(|e| e.channels),
            samplerate: inst.config.encode.map(|e| e.sample_rate),
        };
        let metadata_headers = [
            inst.config.metadata.name.clone().map(|v| ("name".to_string(), v)),
            inst.config.metadata.genre.clone().map(|v| ("genre".to_string(), v)),
            inst.config.metadata.description.clone().map(|v| ("description".to_string(), v)),
            inst.config.metadata.url.clone().map(|v| ("url".to_string(), v)),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        match ShoutClient::connect(&inst.config.target, &audio_info, &metadata_headers).await {
            Ok(client) => {
                inst.client = Some(client);
                return true;
            },
            Err(e) => {
                tracing::warn!(instance = %inst.config.name, attempt, error = %e, "connect failed");
                if !retry_initial && attempt == 1 {
                    return false;
                }
                if !inst.config.retry.attempt_allowed(attempt) {
                    return false;
                }
                let delay = tokio::time::sleep(std::time::Duration::from_secs(
                    inst.config.retry.reconnect_delay_secs,
                ));
                tokio::select! {
                    () = delay => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return false;
                        }
                    }
                }
            },
        }
    }
}

fn non_negative(v: i32) -> Option<i32> {
    if v >= 0 {
        Some(v)
    } else {
        None
    }
}

async fn process_and_send(inst: &mut RunningInstance, buf: &RefBuffer) -> SendOutcome {
    let mut payload: Vec<u8> = match &mut inst.chain {
        Chain::Passthrough => buf.bytes().to_vec(),
        Chain::Encode(chain) => {
            let mut pages: Vec<RefBuffer> = Vec::new();
            if buf.is_critical() {
                match chain.restart(serial::next_serial(), &inst.comments) {
                    Ok((tail, header)) => {
                        pages.extend(tail);
                        inst.pending_header = Some(header);
                    },
                    Err(e) => {
                        tracing::error!(instance = %inst.config.name, error = %e, "encoder restart failed");
                        return SendOutcome::TransformFatal;
                    },
                }
            }
            match chain.process(buf.bytes()) {
                Ok(more) => pages.extend(more),
                Err(e) => {
                    tracing::warn!(instance = %inst.config.name, error = %e, "encode failed");
                    return SendOutcome::TransformFatal;
                },
            }
            if pages.is_empty() && inst.pending_header.is_none() {
                return SendOutcome::NoData;
            }
            pages.iter().flat_map(|p| p.bytes().to_vec()).collect()
        },
        Chain::Reencode(reencoder) => {
            let header_len = match buf.aux() {
                ices_core::BufferAux::VorbisHeaderLen(n) => n,
                _ => 0,
            };
            let serialno = page_serialno(&buf.bytes()[..header_len.min(buf.len())]);
            match reencoder.process(buf, serialno) {
                Ok(pages) if pages.is_empty() => return SendOutcome::NoData,
                Ok(pages) => pages.iter().flat_map(|p| p.bytes().to_vec()).collect(),
                Err(_) => return SendOutcome::TransformFatal,
            }
        },
    };

    if let Some(header) = inst.pending_header.take() {
        let mut with_header = header.bytes().to_vec();
        with_header.extend(payload);
        payload = with_header;
    }

    if let Some(savefile) = inst.savefile.as_mut() {
        if let Err(e) = savefile.write_all(&payload).await {
            tracing::warn!(error = %e, "savefile write failed");
        }
    }

    let Some(client) = inst.client.as_mut() else {
        return SendOutcome::SendFailed;
    };

    match client.send(&payload).await {
        Ok(()) => SendOutcome::Success,
        Err(SendError::Socket(e)) => {
            tracing::warn!(instance = %inst.config.name, error = %e, "socket send failed");
            SendOutcome::SendFailed
        },
    }
}

