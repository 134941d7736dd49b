pub mod level;
pub mod record;
pub mod error;
pub mod encoder;
pub mod client;
pub mod stats;
pub mod flush;
pub mod buffer;
pub mod hook;
pub mod layer;

#[cfg(feature = "firehose")]
pub mod firehose;

pub mod init;
pub mod noop_client;

pub use hook::{FirehoseHook, HookConfig};
pub use level::Level;
pub use record::{Entry, FieldValue};
