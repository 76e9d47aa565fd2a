// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Metadata side channel (spec.md §6 "Metadata side-channel").
//!
//! Waits on `SIGUSR1` (the "event-pending condition" of spec.md §5), then
//! reads lines from the configured metadata source until a blank line or
//! EOF, strips trailing CR/LF, and forwards the batch as one
//! `InputEvent::MetadataUpdate`.

use std::path::PathBuf;

use ices_core::InputEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Where metadata updates are read from once signalled.
pub enum MetadataSource {
    File(PathBuf),
    Stdin,
}

/// Runs until `shutdown` fires. Each `SIGUSR1` triggers one read pass.
pub async fn run(
    source: MetadataSource,
    events: mpsc::Sender<InputEvent>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut sigusr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGUSR1 handler, metadata side channel disabled");
            return;
        },
    };

    loop {
        tokio::select! {
            _ = sigusr1.recv() => {
                tracing::debug!("metadata_update_signalled");
                let lines = read_lines(&source).await;
                if !lines.is_empty() && events.send(InputEvent::MetadataUpdate(lines)).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn read_lines(source: &MetadataSource) -> Vec<String> {
    match source {
        MetadataSource::File(path) => match tokio::fs::File::open(path).await {
            Ok(file) => collect_until_blank(BufReader::new(file)).await,
            Err(e) => {
                tracing::warn!(error = %e, ?path, "failed to open metadata file");
                Vec::new()
            },
        },
        MetadataSource::Stdin => collect_until_blank(BufReader::new(tokio::io::stdin())).await,
    }
}

async fn collect_until_blank<R: tokio::io::AsyncRead + Unpin>(mut reader: BufReader<R>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\r', '\n']);
                if trimmed.is_empty() {
                    break;
                }
                lines.push(trimmed.to_string());
            },
            Err(_) => break,
        }
    }
    lines
}
