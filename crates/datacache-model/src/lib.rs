// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Data model shared by the catalog clients and the local cache.
//!
//! A [`FileDescriptor`] describes one remotely available file, a
//! [`LocalFileEntry`] one file found in the cache directory, and an
//! [`UpdateRequest`] the planner's decision linking the two.

mod descriptor;
mod local;
mod request;
mod timestamp;

pub use descriptor::{
    validate_file_name, Checksum, FileDescriptor, UpdateFrequency, ValidationError,
};
pub use local::LocalFileEntry;
pub use request::{UpdateReason, UpdateRequest};
pub use timestamp::{generic_key, split_timestamped_name, TimestampedName, GENERIC_KEY_SEPARATOR};

pub const CRATE_NAME: &str = "datacache-model";
