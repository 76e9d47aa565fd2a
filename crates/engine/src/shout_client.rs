// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Icecast source-client wire protocol (spec.md §6 "Wire protocol"): an
//! HTTP `SOURCE`/`PUT` request with a Vorbis content-type declaration,
//! `Basic` source authentication, and audio-info headers, followed by a raw
//! byte stream of Ogg pages.

use base64::Engine;
use ices_core::{IcesError, InstanceTarget, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Audio-info hints sent as headers at connect time (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct AudioInfo {
    pub bitrate: Option<i32>,
    pub quality: Option<f32>,
    pub channels: Option<u16>,
    pub samplerate: Option<u32>,
}

/// One classification of send failure (spec.md §4.6 send-error handling).
#[derive(Debug)]
pub enum SendError {
    /// The underlying socket failed; caller should close and reconnect.
    Socket(std::io::Error),
}

pub struct ShoutClient {
    stream: TcpStream,
}

impl ShoutClient {
    /// Opens a TCP connection to `target` and performs the `SOURCE` request,
    /// sending `name`/`genre`/`description`/`url`/public/audio-info headers.
    /// Returns once the server has accepted the stream (2xx response).
    pub async fn connect(
        target: &InstanceTarget,
        audio_info: &AudioInfo,
        metadata_headers: &[(String, String)],
    ) -> Result<Self> {
        let addr = format!("{}:{}", target.hostname, target.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| IcesError::Network(format!("connect to {addr} failed: {e}")))?;

        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", target.username, target.password));

        let mut request = format!(
            "SOURCE {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Authorization: Basic {auth}\r\n\
             User-Agent: icesrc\r\n\
             Content-Type: application/ogg\r\n\
             ice-public: {}\r\n",
            target.mount,
            target.hostname,
            i32::from(target.public),
        );

        for (key, value) in metadata_headers {
            request.push_str(&format!("ice-{key}: {value}\r\n"));
        }
        if let Some(bitrate) = audio_info.bitrate {
            request.push_str(&format!("ice-bitrate: {bitrate}\r\n"));
        }
        if let Some(quality) = audio_info.quality {
            request.push_str(&format!("ice-quality: {quality}\r\n"));
        }
        if let Some(channels) = audio_info.channels {
            request.push_str(&format!("ice-audio-info: channels={channels}"));
            if let Some(rate) = audio_info.samplerate {
                request.push_str(&format!(";samplerate={rate}"));
            }
            request.push_str("\r\n");
        }
        request.push_str("\r\n");

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| IcesError::Network(format!("source request write failed: {e}")))?;

        let status = Self::read_status_line(&mut stream).await?;
        if !(200..300).contains(&status) {
            return Err(IcesError::Network(format!("server rejected SOURCE request: HTTP {status}")));
        }

        Ok(Self { stream })
    }

    async fn read_status_line(stream: &mut TcpStream) -> Result<u16> {
        let mut buf = Vec::with_capacity(512);
        let mut byte = [0u8; 1];
        loop {
            let n = stream.read(&mut byte).await.map_err(|e| IcesError::Network(e.to_string()))?;
            if n == 0 {
                return Err(IcesError::Network("connection closed before response".into()));
            }
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n\r\n") || buf.len() > 8192 {
                break;
            }
        }

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        response
            .parse(&buf)
            .map_err(|e| IcesError::Network(format!("malformed server response: {e}")))?;
        response.code.ok_or_else(|| IcesError::Network("server response missing status code".into()))
    }

    /// Sends one raw chunk of bytes; a socket error here is the `Socket`
    /// send-error case in spec.md §4.6/§4.7.
    pub async fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), SendError> {
        self.stream.write_all(bytes).await.map_err(SendError::Socket)
    }
}
