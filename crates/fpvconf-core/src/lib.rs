//! fpvconf-core - Shared types for configuring OpenIPC FPV devices
//!
//! Everything a caller hands to the codecs and the remote engine lives
//! here: the per-call [`DeviceTarget`], the catalogue of configuration
//! files on the device, the fixed shell command surface, and the
//! progress/outcome types reported back from long-running operations.

pub mod commands;
pub mod files;
pub mod progress;
pub mod target;

pub use commands::Service;
pub use files::{Dialect, RemoteFile, UnknownFile};
pub use progress::{ProgressEvent, ProgressSink, SessionOutcome};
pub use target::{DeviceKind, DeviceTarget, DEFAULT_SSH_PORT};
