// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Events delivered to input modules (spec.md §4.4).

/// An event delivered to an input module's `handle_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// The process is shutting down; the module should release its resources.
    Shutdown,
    /// Pause input production (device-backed modules only).
    Pause,
    /// Advance to the next logical stream (track change, reencode serialno switch,
    /// or pacing-loss recovery per spec.md §4.5 step 5).
    NextTrack,
    /// Configuration was reloaded; modules that cache config-derived state should refresh it.
    Reconfigure,
    /// Lines read from the metadata side channel (spec.md §6), already stripped of
    /// trailing CR/LF and blank terminators.
    MetadataUpdate(Vec<String>),
}
