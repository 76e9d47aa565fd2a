// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Logging setup (SPEC_FULL.md §10.2): a console layer and an optional
//! file layer, independently leveled, the way `apps/skit/src/logging.rs`
//! wires `tracing-subscriber` layers together. `logsize` is honored via
//! [`SizeRollingWriter`], since `tracing-appender`'s stock rollers are
//! time-based and the original `logging.c` rotates by size instead.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::RawConfig;

fn level_from_verbosity(loglevel: i32) -> tracing::Level {
    match loglevel {
        ..=1 => tracing::Level::ERROR,
        2 => tracing::Level::WARN,
        3 => tracing::Level::INFO,
        4 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

fn env_filter_or_level(default_level: tracing::Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

struct RollingState {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

/// A `Write` target that reopens (truncates) its file once it grows past
/// `max_bytes`, mirroring the original `logging.c`'s
/// open-append-check-size-reopen loop. `max_bytes == 0` disables rotation.
pub struct SizeRollingWriter {
    state: Mutex<RollingState>,
}

impl SizeRollingWriter {
    pub fn open(path: PathBuf, max_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self { state: Mutex::new(RollingState { path, file, written, max_bytes }) })
    }
}

impl Write for &SizeRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        #[allow(clippy::unwrap_used)]
        let mut state = self.state.lock().unwrap();
        if state.max_bytes > 0 && state.written >= state.max_bytes {
            state.file = OpenOptions::new().create(true).write(true).truncate(true).open(&state.path)?;
            state.written = 0;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        #[allow(clippy::unwrap_used)]
        self.state.lock().unwrap().file.flush()
    }
}

impl<'a> MakeWriter<'a> for SizeRollingWriter {
    type Writer = &'a SizeRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

impl<'a> MakeWriter<'a> for Arc<SizeRollingWriter> {
    type Writer = &'a SizeRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.as_ref()
    }
}

/// Initializes the global `tracing` subscriber from the parsed config.
/// Returns the file sink when one was configured; the caller must keep it
/// alive for the process lifetime.
pub fn init(config: &RawConfig) -> anyhow::Result<Option<Arc<SizeRollingWriter>>> {
    let level = level_from_verbosity(config.loglevel);
    let mut layers: Vec<Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>> = Vec::new();

    let file_sink = match (&config.logpath, &config.logfile) {
        (Some(dir), Some(name)) => {
            std::fs::create_dir_all(dir)?;
            Some(Arc::new(SizeRollingWriter::open(PathBuf::from(dir).join(name), config.logsize)?))
        },
        _ => None,
    };

    if let Some(sink) = &file_sink {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::clone(sink))
                .with_ansi(false)
                .with_filter(env_filter_or_level(level))
                .boxed(),
        );
    }

    if config.consolelog != 0 || file_sink.is_none() {
        layers.push(tracing_subscriber::fmt::layer().with_filter(env_filter_or_level(level)).boxed());
    }

    tracing_subscriber::registry().with(layers).init();

    if let Some(sink) = &file_sink {
        let path = sink.state.lock().map(|s| s.path.clone()).unwrap_or_default();
        tracing::info!(?path, "file logging enabled");
    }

    Ok(file_sink)
}
