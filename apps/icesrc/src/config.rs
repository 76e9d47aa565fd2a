// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! XML configuration (spec.md §6), loaded with `quick-xml`'s serde
//! integration the way the pack's XML-driven crates do.

use std::path::Path;

use ices_core::{
    EncodeParams, IcesError, InstanceConfig, InstanceTarget, MetadataOverrides, ResampleParams,
    RetryPolicy, Result,
};
use serde::Deserialize;

fn default_port() -> u16 {
    8000
}
fn default_password() -> String {
    "password".to_string()
}
fn default_username() -> String {
    "source".to_string()
}
fn default_mount() -> String {
    "/stream.ogg".to_string()
}
fn default_reconnect_delay() -> u64 {
    2
}
fn default_reconnect_attempts() -> i32 {
    10
}
fn default_max_queue_length() -> usize {
    100
}
fn default_neg_one() -> i32 {
    -1
}
fn default_quality() -> f32 {
    3.0
}
fn default_samplerate() -> u32 {
    44100
}
fn default_channels() -> u16 {
    2
}
fn default_loglevel() -> i32 {
    3
}
fn default_console_log() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ices")]
pub struct RawConfig {
    #[serde(default)]
    pub background: i32,
    pub logpath: Option<String>,
    pub logfile: Option<String>,
    pub pidfile: Option<String>,
    #[serde(default = "default_loglevel")]
    pub loglevel: i32,
    #[serde(default)]
    pub logsize: u64,
    #[serde(default = "default_console_log")]
    pub consolelog: i32,
    pub stream: StreamConfig,
}

#[derive(Debug, Deserialize)]
pub struct StreamConfig {
    pub metadata: Option<MetadataXml>,
    pub input: InputXml,
    #[serde(rename = "instance", default)]
    pub instances: Vec<InstanceXml>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MetadataXml {
    pub name: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InputXml {
    pub module: String,
    #[serde(rename = "param", default)]
    pub params: Vec<ParamXml>,
}

#[derive(Debug, Deserialize)]
pub struct ParamXml {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ResampleXml {
    #[serde(rename = "in-rate", default)]
    pub in_rate: u32,
    #[serde(rename = "out-rate", default)]
    pub out_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct EncodeXml {
    #[serde(rename = "nominal-bitrate", default = "default_neg_one")]
    pub nominal_bitrate: i32,
    #[serde(rename = "minimum-bitrate", default = "default_neg_one")]
    pub minimum_bitrate: i32,
    #[serde(rename = "maximum-bitrate", default = "default_neg_one")]
    pub maximum_bitrate: i32,
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default = "default_samplerate")]
    pub samplerate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub managed: i32,
    #[serde(rename = "flush-samples", default)]
    pub flush_samples: u32,
}

#[derive(Debug, Deserialize)]
pub struct InstanceXml {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_mount")]
    pub mount: String,
    #[serde(default)]
    pub yp: i32,
    pub savefile: Option<String>,
    #[serde(rename = "reconnectdelay", default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
    #[serde(rename = "reconnectattempts", default = "default_reconnect_attempts")]
    pub reconnect_attempts: i32,
    #[serde(rename = "retry-initial", default)]
    pub retry_initial: i32,
    #[serde(rename = "maxqueuelength", default = "default_max_queue_length")]
    pub max_queue_length: usize,
    #[serde(default)]
    pub downmix: i32,
    pub resample: Option<ResampleXml>,
    pub encode: Option<EncodeXml>,
    pub metadata: Option<MetadataXml>,
}

/// The outcome of loading configuration: the parsed document plus whether
/// the file was missing and defaults were substituted (spec.md §7
/// Config-fatal only applies to unparseable files; a missing file is not
/// itself fatal for the `Default` trait path callers may choose to take).
pub struct LoadResult {
    pub config: RawConfig,
}

/// Loads and parses the XML config at `path` (spec.md §6, §7 Config-fatal).
pub fn load(path: &Path) -> Result<LoadResult> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| IcesError::Configuration(format!("cannot read {}: {e}", path.display())))?;
    let config: RawConfig = quick_xml::de::from_str(&text)
        .map_err(|e| IcesError::Configuration(format!("malformed config {}: {e}", path.display())))?;
    validate(&config)?;
    Ok(LoadResult { config })
}

/// Validates cross-field invariants spec.md §7 calls "Config-fatal": a
/// missing playlist module, or an instance with no hostname.
fn validate(config: &RawConfig) -> Result<()> {
    if config.stream.input.module.trim().is_empty() {
        return Err(IcesError::Configuration("stream/input/module is required".into()));
    }
    if config.stream.instances.is_empty() {
        return Err(IcesError::Configuration("at least one stream/instance is required".into()));
    }
    for instance in &config.stream.instances {
        if instance.hostname.trim().is_empty() {
            return Err(IcesError::Configuration("instance hostname is required".into()));
        }
    }
    Ok(())
}

fn metadata_overrides(xml: &Option<MetadataXml>) -> MetadataOverrides {
    xml.as_ref().map_or_else(MetadataOverrides::default, |m| MetadataOverrides {
        name: m.name.clone(),
        genre: m.genre.clone(),
        description: m.description.clone(),
        url: m.url.clone(),
    })
}

/// Converts one parsed `stream/instance` into the engine's runtime config type.
pub fn to_instance_config(index: usize, xml: &InstanceXml) -> InstanceConfig {
    InstanceConfig {
        name: format!("{}:{}{}", xml.hostname, xml.port, xml.mount),
        target: InstanceTarget {
            hostname: xml.hostname.clone(),
            port: xml.port,
            mount: xml.mount.clone(),
            username: xml.username.clone(),
            password: xml.password.clone(),
            public: xml.yp != 0,
        },
        retry: RetryPolicy {
            reconnect_delay_secs: xml.reconnect_delay,
            reconnect_attempts: xml.reconnect_attempts,
            retry_initial_connection: xml.retry_initial != 0,
        },
        downmix: xml.downmix != 0,
        resample: xml.resample.as_ref().map_or(ResampleParams { in_hz: 0, out_hz: 0 }, |r| ResampleParams {
            in_hz: r.in_rate,
            out_hz: r.out_rate,
        }),
        encode: xml.encode.as_ref().map(|e| EncodeParams {
            channels: e.channels,
            sample_rate: e.samplerate,
            quality: e.quality,
            min_bitrate: e.minimum_bitrate,
            nominal_bitrate: e.nominal_bitrate,
            max_bitrate: e.maximum_bitrate,
            managed: e.managed != 0,
            flush_samples: e.flush_samples,
        }),
        metadata: metadata_overrides(&xml.metadata),
        savefile: xml.savefile.as_ref().map(std::path::PathBuf::from),
        max_queue_length: xml.max_queue_length,
    }
        .with_index(index)
}

trait WithIndex {
    fn with_index(self, index: usize) -> Self;
}

impl WithIndex for InstanceConfig {
    /// Disambiguates instance names sharing the same host/mount (two
    /// instances can legitimately target the same mountpoint with
    /// different bitrates).
    fn with_index(mut self, index: usize) -> Self {
        if index > 0 {
            self.name = format!("{}#{index}", self.name);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        <ices>
          <stream>
            <input>
              <module>stdin</module>
              <param name="rate">44100</param>
              <param name="channels">2</param>
            </input>
            <instance>
              <hostname>localhost</hostname>
              <encode>
                <nominal-bitrate>64000</nominal-bitrate>
              </encode>
            </instance>
          </stream>
        </ices>
    "#;

    #[test]
    fn parses_minimal_document_with_defaults() {
        let config: RawConfig = quick_xml::de::from_str(MINIMAL).unwrap();
        assert_eq!(config.stream.input.module, "stdin");
        assert_eq!(config.stream.input.params.len(), 2);
        assert_eq!(config.stream.instances.len(), 1);

        let instance = &config.stream.instances[0];
        assert_eq!(instance.port, 8000);
        assert_eq!(instance.mount, "/stream.ogg");
        assert_eq!(instance.username, "source");
        assert_eq!(instance.reconnect_delay, 2);
        assert_eq!(instance.max_queue_length, 100);
    }

    #[test]
    fn to_instance_config_maps_encode_block() {
        let config: RawConfig = quick_xml::de::from_str(MINIMAL).unwrap();
        let instance = to_instance_config(0, &config.stream.instances[0]);
        let encode = instance.encode.expect("encode block present");
        assert_eq!(encode.nominal_bitrate, 64000);
        assert_eq!(encode.quality, 3.0);
    }

    #[test]
    fn rejects_document_missing_input_module() {
        let bad = MINIMAL.replace("<module>stdin</module>", "<module></module>");
        let config: RawConfig = quick_xml::de::from_str(&bad).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_document_with_no_instances() {
        let bad = r#"
            <ices>
              <stream>
                <input><module>stdin</module></input>
              </stream>
            </ices>
        "#;
        let config: RawConfig = quick_xml::de::from_str(bad).unwrap();
        assert!(validate(&config).is_err());
    }
}
