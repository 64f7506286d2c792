//! Remote media: hands the negotiated stream to the tracking pipeline's video element.

use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use mimic_tracking::{FrameSlot, VideoElement, VideoFrame, VideoSource};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::track::track_remote::TrackRemote;

use crate::session::RemoteStream;

/// RTP clock rate for video payloads.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;
/// Upper bound for one reassembled frame.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Consumer of the negotiated remote stream.
pub trait MediaSink: Send + Sync {
    fn attach(&self, stream: &RemoteStream);
    fn detach(&self);
}

/// Joins RTP payloads sharing a timestamp into one frame, closed by the marker bit.
#[derive(Debug)]
pub struct FrameAssembler {
    clock_rate: u32,
    first_timestamp: Option<u32>,
    timestamp: Option<u32>,
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate,
            first_timestamp: None,
            timestamp: None,
            buffer: BytesMut::new(),
        }
    }

    pub fn push(&mut self, timestamp: u32, marker: bool, payload: &[u8]) -> Option<VideoFrame> {
        if self.timestamp != Some(timestamp) {
            if !self.buffer.is_empty() {
                debug!("Dropping incomplete frame ({} bytes)", self.buffer.len());
            }
            self.buffer.clear();
            self.timestamp = Some(timestamp);
        }

        if self.buffer.len() + payload.len() > MAX_FRAME_BYTES {
            warn!("Remote frame exceeds {} bytes, dropping", MAX_FRAME_BYTES);
            self.buffer.clear();
            self.timestamp = None;
            return None;
        }
        self.buffer.extend_from_slice(payload);

        if !marker {
            return None;
        }
        self.timestamp = None;
        let data = self.buffer.split().freeze();
        Some(VideoFrame {
            position: self.position(timestamp),
            width: 0,
            height: 0,
            data,
        })
    }

    /// Seconds since the first packet, from the RTP clock.
    fn position(&mut self, timestamp: u32) -> f64 {
        let first = *self.first_timestamp.get_or_insert(timestamp);
        f64::from(timestamp.wrapping_sub(first)) / f64::from(self.clock_rate)
    }
}

/// Latest reassembled frame of a remote track.
///
/// Frames carry the encoded access unit; dimensions are left at zero.
/// Dropping the source stops reading the track.
pub struct RemoteVideoSource {
    slot: Arc<FrameSlot>,
    reader: JoinHandle<()>,
}

impl RemoteVideoSource {
    pub fn spawn(track: Arc<TrackRemote>) -> Self {
        let slot = Arc::new(FrameSlot::new());
        let frames = slot.clone();
        let reader = tokio::spawn(async move {
            let mut assembler = FrameAssembler::new(VIDEO_CLOCK_RATE);
            loop {
                match track.read_rtp().await {
                    Ok((packet, _)) => {
                        if let Some(frame) = assembler.push(
                            packet.header.timestamp,
                            packet.header.marker,
                            &packet.payload,
                        ) {
                            frames.publish(frame);
                        }
                    }
                    Err(e) => {
                        info!("Remote video track ended: {}", e);
                        break;
                    }
                }
            }
        });
        Self { slot, reader }
    }
}

impl VideoSource for RemoteVideoSource {
    fn current_frame(&self) -> Option<VideoFrame> {
        self.slot.current_frame()
    }
}

impl Drop for RemoteVideoSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Plays the remote stream into a [`VideoElement`].
pub struct VideoElementSink {
    video: VideoElement,
    current: Mutex<Option<String>>,
}

impl VideoElementSink {
    pub fn new(video: VideoElement) -> Self {
        Self {
            video,
            current: Mutex::new(None),
        }
    }

    /// Stream id currently playing, if any.
    pub fn current_stream(&self) -> Option<String> {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_current(&self, stream: Option<String>) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = stream;
    }
}

impl MediaSink for VideoElementSink {
    fn attach(&self, stream: &RemoteStream) {
        let Some(track) = stream.track.clone() else {
            warn!("Remote stream {} has no media track", stream.stream_id);
            return;
        };
        info!("Playing remote stream {}", stream.stream_id);
        self.video.attach(Arc::new(RemoteVideoSource::spawn(track)));
        self.set_current(Some(stream.stream_id.clone()));
    }

    fn detach(&self) {
        self.video.detach();
        self.set_current(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_completes_frame() {
        let mut assembler = FrameAssembler::new(VIDEO_CLOCK_RATE);
        assert!(assembler.push(1000, false, b"ab").is_none());
        let frame = assembler.push(1000, true, b"cd").unwrap();
        assert_eq!(&frame.data[..], b"abcd");
        assert_eq!(frame.position, 0.0);

        let next = assembler.push(1000 + 3000, true, b"ef").unwrap();
        assert_eq!(&next.data[..], b"ef");
        assert!((next.position - 3000.0 / 90_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_incomplete_frame_is_dropped_on_new_timestamp() {
        let mut assembler = FrameAssembler::new(VIDEO_CLOCK_RATE);
        assert!(assembler.push(10, false, b"lost").is_none());
        let frame = assembler.push(20, true, b"kept").unwrap();
        assert_eq!(&frame.data[..], b"kept");
    }

    #[test]
    fn test_timestamp_wraparound() {
        let mut assembler = FrameAssembler::new(VIDEO_CLOCK_RATE);
        assembler.push(u32::MAX - 89_999, true, b"a").unwrap();
        let frame = assembler.push(0, true, b"b").unwrap();
        assert!((frame.position - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sink_ignores_stream_without_track() {
        let video = VideoElement::new();
        let sink = VideoElementSink::new(video.clone());
        sink.attach(&RemoteStream::new("stream", "track"));
        assert!(!video.has_source());
        assert_eq!(sink.current_stream(), None);
    }
}
