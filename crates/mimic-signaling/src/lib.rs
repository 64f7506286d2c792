//! Signaling for the single peer connection between host and surface.
//!
//! The surface is always the answerer: the host sends an offer through the
//! [`HostBridge`](mimic_bridge::HostBridge), the [`SignalingMachine`] applies
//! it, answers, and trades ICE candidates until the transport connects. All
//! state lives in one actor task started by [`spawn_signaling`].

#![forbid(unsafe_code)]

pub mod link;
pub mod machine;
pub mod media;
pub mod rtc;
pub mod service;
pub mod session;

pub use link::{PeerEvent, PeerEventReceiver, PeerEvents, PeerFactory, PeerLink};
pub use machine::SignalingMachine;
pub use media::{FrameAssembler, MediaSink, RemoteVideoSource, VideoElementSink};
pub use rtc::{RtcPeerFactory, RtcPeerLink};
pub use service::{spawn_signaling, SignalingHandle};
pub use session::{ConnectionState, PeerSession, RemoteStream, SignalingState};
