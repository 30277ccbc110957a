//! Command implementations for fpvconf

pub mod config;
pub mod device;
pub mod files;
pub mod scan;
pub mod upgrade;

pub use config::{get, set};
pub use device::{exec, hostname, keygen, reboot, restart, uart};
pub use files::{download, upload};
pub use scan::scan;
pub use upgrade::upgrade;
