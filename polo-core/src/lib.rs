//! Polo core library: configuration model, file location, parsing and fingerprints.
//!
//! Public API surface:
//! - [`types`]: newtypes, [`Configuration`] and [`Settings`]
//! - [`fingerprint`]: content digests used for change detection
//! - [`locate`]: configuration file search order
//! - [`config`]: parse a file into a [`Configuration`] snapshot
//! - [`handle`]: [`ConfigHandle`], the atomically swappable current config
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod handle;
pub mod locate;
pub mod types;

pub use error::ConfigError;
pub use fingerprint::Fingerprint;
pub use handle::ConfigHandle;
pub use types::{Configuration, Settings, SourceDescriptor, SourceId};
