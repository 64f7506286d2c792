//! Host bridge: outbound JSON messages to the embedding host, inbound entry points from it.

#![forbid(unsafe_code)]

pub mod bridge;
pub mod channel;
pub mod relay;

pub use bridge::{EntryPoint, EntryRegistration, HostBridge};
pub use channel::{HostChannel, QueueChannel, StdoutChannel};
pub use relay::{motion_message, MotionRelay};
