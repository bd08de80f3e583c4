pub mod error;
pub mod record;
pub mod env;
pub mod config;
pub mod backtrace;
pub mod context;
pub mod enricher;
pub mod router;
pub mod sink;
pub mod registry;
pub mod layer;

#[cfg(feature = "console")]
pub mod console;

pub mod init;
pub mod noop_sink;
