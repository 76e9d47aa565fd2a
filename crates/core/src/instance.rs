// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Static, per-instance configuration (spec.md §3 "Instance", §6 `stream/instance`).
//!
//! These types hold only the values read from configuration; the mutable
//! runtime state of a live instance (`died`, `skip`, `wait_for_critical`,
//! `buffer_failures`, its queue) lives in `ices_engine::instance` next to the
//! thread/task that owns it.

/// Target server endpoint and authentication for one streaming destination.
#[derive(Debug, Clone)]
pub struct InstanceTarget {
    pub hostname: String,
    pub port: u16,
    pub mount: String,
    pub username: String,
    pub password: String,
    /// Whether to request public listing (YP) from the server.
    pub public: bool,
}

impl Default for InstanceTarget {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: 8000,
            mount: "/stream.ogg".to_string(),
            username: "source".to_string(),
            password: "password".to_string(),
            public: false,
        }
    }
}

/// Reconnect behavior for one instance (spec.md §4.6).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub reconnect_delay_secs: u64,
    /// -1 means unbounded attempts.
    pub reconnect_attempts: i32,
    pub retry_initial_connection: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { reconnect_delay_secs: 2, reconnect_attempts: 10, retry_initial_connection: false }
    }
}

impl RetryPolicy {
    /// Whether `attempt` (1-based) is still within the configured attempt budget.
    pub fn attempt_allowed(&self, attempt: i32) -> bool {
        self.reconnect_attempts < 0 || attempt <= self.reconnect_attempts
    }
}

/// Resample stage parameters (spec.md §4.3 `Resample`).
#[derive(Debug, Clone, Copy)]
pub struct ResampleParams {
    pub in_hz: u32,
    pub out_hz: u32,
}

impl ResampleParams {
    pub fn is_enabled(&self) -> bool {
        self.in_hz > 0 && self.out_hz > 0 && self.in_hz != self.out_hz
    }
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self { in_hz: 0, out_hz: 0 }
    }
}

/// Vorbis bitrate-management mode, selected per spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BitrateMode {
    /// Quality-targeted VBR; `quality` is in `[-1.0, 10.0]` (libvorbis convention, -0.1..1.0 internally).
    Vbr { quality: f32 },
    /// Managed `{min, nominal, max}` bits/sec envelope.
    Managed { min: Option<i32>, nominal: Option<i32>, max: Option<i32> },
    /// Average bitrate from `nominal` alone, unmanaged.
    Abr { nominal: i32 },
}

/// Raw encode parameters as read from configuration, before mode selection.
#[derive(Debug, Clone, Copy)]
pub struct EncodeParams {
    pub channels: u16,
    pub sample_rate: u32,
    pub quality: f32,
    pub min_bitrate: i32,
    pub nominal_bitrate: i32,
    pub max_bitrate: i32,
    pub managed: bool,
    /// Forced page flush threshold in samples; 0 means "use the default" (spec.md §4.3).
    pub flush_samples: u32,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            quality: 3.0,
            min_bitrate: -1,
            nominal_bitrate: -1,
            max_bitrate: -1,
            managed: false,
            flush_samples: 0,
        }
    }
}

impl EncodeParams {
    /// Selects the bitrate-management mode per spec.md §4.3:
    ///
    /// - all three bitrates negative -> VBR by quality;
    /// - `managed` and any bitrate set -> managed triple;
    /// - `nominal` set without `managed` but `min`/`max` also set -> managed triple;
    /// - otherwise, if `nominal` is set, plain ABR from nominal alone;
    /// - otherwise (nothing set and not managed) falls back to VBR by quality.
    pub fn bitrate_mode(&self) -> BitrateMode {
        let any_set = self.min_bitrate >= 0 || self.nominal_bitrate >= 0 || self.max_bitrate >= 0;

        if !any_set {
            return BitrateMode::Vbr { quality: self.quality };
        }

        if self.managed {
            return BitrateMode::Managed {
                min: non_negative(self.min_bitrate),
                nominal: non_negative(self.nominal_bitrate),
                max: non_negative(self.max_bitrate),
            };
        }

        if self.nominal_bitrate >= 0 {
            if self.min_bitrate >= 0 || self.max_bitrate >= 0 {
                return BitrateMode::Managed {
                    min: non_negative(self.min_bitrate),
                    nominal: non_negative(self.nominal_bitrate),
                    max: non_negative(self.max_bitrate),
                };
            }
            return BitrateMode::Abr { nominal: self.nominal_bitrate };
        }

        // min and/or max set without a nominal: still a managed envelope.
        BitrateMode::Managed {
            min: non_negative(self.min_bitrate),
            nominal: None,
            max: non_negative(self.max_bitrate),
        }
    }

    /// Effective forced-flush threshold in samples, per spec.md §4.3: defaults to
    /// the input sample rate, clamped to at least `rate/100`.
    pub fn effective_max_samples_ppage(&self) -> u32 {
        if self.flush_samples > 0 {
            return self.flush_samples;
        }
        self.sample_rate.max(self.sample_rate / 100).max(1)
    }
}

fn non_negative(v: i32) -> Option<i32> {
    if v >= 0 {
        Some(v)
    } else {
        None
    }
}

/// Instance-local metadata overrides (spec.md §3); unset fields fall back to
/// the stream-wide `stream/metadata` values.
#[derive(Debug, Clone, Default)]
pub struct MetadataOverrides {
    pub name: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

/// Complete static configuration for one streaming destination.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub name: String,
    pub target: InstanceTarget,
    pub retry: RetryPolicy,
    pub downmix: bool,
    pub resample: ResampleParams,
    pub encode: Option<EncodeParams>,
    pub metadata: MetadataOverrides,
    pub savefile: Option<std::path::PathBuf>,
    pub max_queue_length: usize,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            target: InstanceTarget::default(),
            retry: RetryPolicy::default(),
            downmix: false,
            resample: ResampleParams::default(),
            encode: None,
            metadata: MetadataOverrides::default(),
            savefile: None,
            max_queue_length: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_mode_selects_vbr_when_all_unset() {
        let p = EncodeParams { quality: 6.0, ..Default::default() };
        assert_eq!(p.bitrate_mode(), BitrateMode::Vbr { quality: 6.0 });
    }

    #[test]
    fn bitrate_mode_selects_abr_from_nominal_alone() {
        let p = EncodeParams { nominal_bitrate: 64000, ..Default::default() };
        assert_eq!(p.bitrate_mode(), BitrateMode::Abr { nominal: 64000 });
    }

    #[test]
    fn bitrate_mode_selects_managed_triple_when_min_also_set() {
        let p = EncodeParams { nominal_bitrate: 64000, min_bitrate: 48000, ..Default::default() };
        assert_eq!(
            p.bitrate_mode(),
            BitrateMode::Managed { min: Some(48000), nominal: Some(64000), max: None }
        );
    }

    #[test]
    fn bitrate_mode_selects_managed_triple_when_max_also_set() {
        let p = EncodeParams { nominal_bitrate: 64000, max_bitrate: 80000, ..Default::default() };
        assert_eq!(
            p.bitrate_mode(),
            BitrateMode::Managed { min: None, nominal: Some(64000), max: Some(80000) }
        );
    }

    #[test]
    fn bitrate_mode_honors_explicit_managed_flag() {
        let p = EncodeParams { nominal_bitrate: 64000, managed: true, ..Default::default() };
        assert_eq!(
            p.bitrate_mode(),
            BitrateMode::Managed { min: None, nominal: Some(64000), max: None }
        );
    }

    #[test]
    fn retry_policy_unbounded_attempts() {
        let p = RetryPolicy { reconnect_attempts: -1, ..Default::default() };
        assert!(p.attempt_allowed(1));
        assert!(p.attempt_allowed(10_000));
    }

    #[test]
    fn effective_max_samples_ppage_defaults_to_rate_clamped() {
        let p = EncodeParams { sample_rate: 44100, flush_samples: 0, ..Default::default() };
        assert_eq!(p.effective_max_samples_ppage(), 44100);
    }
}
