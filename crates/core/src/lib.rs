// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core data structures shared between the `icesrc` engine and its CLI front end.
//!
//! ## Modules
//!
//! - [`error`]: The crate-wide error type.
//! - [`buffer`]: The reference-counted payload (`RefBuffer`) that flows from the
//!   producer to every instance queue.
//! - [`instance`]: Configuration types describing one streaming destination.
//! - [`events`]: Events delivered to input modules (shutdown, metadata, track advance).
//! - [`comments`]: Vorbis comment list manipulation shared by encode and reencode.

pub mod buffer;
pub mod comments;
pub mod error;
pub mod events;
pub mod instance;

pub use buffer::{BufferAux, RefBuffer};
pub use comments::Comments;
pub use error::{IcesError, Result};
pub use events::InputEvent;
pub use instance::{
    BitrateMode, EncodeParams, InstanceConfig, InstanceTarget, MetadataOverrides, ResampleParams, RetryPolicy,
};
