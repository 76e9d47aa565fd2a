// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `icesrc`: a live Vorbis source client for Icecast (spec.md §1 OVERVIEW).
//!
//! `main.rs` is a thin wrapper around [`run`]; the modules are exposed as a
//! library too so `tests/` can exercise config parsing end to end.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod signals;

use std::path::PathBuf;

use clap::Parser;
use config::{InputXml, RawConfig};
use ices_core::{Comments, InstanceConfig};
use ices_engine::input::{InputModule, PcmSubtype, PlaylistOggInput, StdinPcmInput};
use ices_engine::instance::InstanceHandle;
use ices_engine::metadata::MetadataSource;
use tokio::sync::{mpsc, watch};

fn param(input: &InputXml, name: &str) -> Option<String> {
    input.params.iter().find(|p| p.name == name).map(|p| p.value.clone())
}

/// Builds the configured input module from `stream/input` (spec.md §4.4,
/// SPEC_FULL.md §11): `stdin` for raw interleaved PCM, `playlist` for a
/// flat file of Ogg/Vorbis tracks.
async fn build_input(input: &InputXml) -> anyhow::Result<Box<dyn InputModule>> {
    match input.module.as_str() {
        "stdin" => {
            let rate: u32 = param(input, "rate").as_deref().unwrap_or("44100").parse()?;
            let channels: u16 = param(input, "channels").as_deref().unwrap_or("2").parse()?;
            let subtype = match param(input, "subtype").as_deref() {
                Some("be16") => PcmSubtype::Be16,
                _ => PcmSubtype::Le16,
            };
            Ok(Box::new(StdinPcmInput::new(subtype, channels, rate)))
        },
        "playlist" => {
            let file = param(input, "file")
                .ok_or_else(|| anyhow::anyhow!("playlist input requires a <param name=\"file\"> entry"))?;
            let repeat = param(input, "repeat").as_deref().map(|v| v != "0").unwrap_or(false);
            let module = PlaylistOggInput::from_playlist_file(std::path::Path::new(&file), repeat).await?;
            Ok(Box::new(module))
        },
        other => Err(anyhow::anyhow!("unknown input module '{other}'")),
    }
}

fn metadata_source(config: &RawConfig) -> MetadataSource {
    match param(&config.stream.input, "metadata-file") {
        Some(path) => MetadataSource::File(PathBuf::from(path)),
        None => MetadataSource::Stdin,
    }
}

fn base_comments(config: &RawConfig) -> Comments {
    let mut comments = Comments::new();
    if let Some(meta) = &config.stream.metadata {
        if let Some(v) = &meta.name {
            comments.set("title", v.as_str());
        }
        if let Some(v) = &meta.genre {
            comments.set("genre", v.as_str());
        }
        if let Some(v) = &meta.description {
            comments.set("description", v.as_str());
        }
    }
    comments
}

/// Runs the full process lifecycle: parse the CLI, load config, wire up
/// logging, build the configured input module and instances, then run the
/// producer and instance-streamer tasks until shutdown (spec.md §4.1
/// "Startup sequence").
pub async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let loaded = match config::load(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("icesrc: {e}");
            std::process::exit(1);
        },
    };
    let raw = loaded.config;

    let _file_sink = logging::init(&raw)?;

    let pidfile = match &raw.pidfile {
        Some(path) => Some(daemon::PidFile::create(std::path::Path::new(path))?),
        None => None,
    };

    let input = build_input(&raw.stream.input).await?;
    let input_kind = input.kind();
    let comments = base_comments(&raw);

    let instance_configs: Vec<InstanceConfig> =
        raw.stream.instances.iter().enumerate().map(|(i, xml)| config::to_instance_config(i, xml)).collect();
    let handles: Vec<InstanceHandle> = instance_configs.into_iter().map(InstanceHandle::new).collect();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(32);

    let instance_tasks = ices_engine::producer::spawn_instances(&handles, input_kind, comments, &shutdown_rx);

    let metadata_task =
        tokio::spawn(ices_engine::metadata::run(metadata_source(&raw), event_tx.clone(), shutdown_rx.clone()));
    let signals_task = tokio::spawn(signals::run(shutdown_tx.clone(), event_tx));

    ices_engine::producer::run(input, handles, event_rx, shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    for task in instance_tasks {
        let _ = task.await;
    }
    let _ = metadata_task.await;
    signals_task.abort();

    drop(pidfile);
    Ok(())
}
