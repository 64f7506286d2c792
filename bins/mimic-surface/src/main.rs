#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimic_bridge::{HostBridge, MotionRelay, StdoutChannel};
use mimic_common::config::DEFAULT_REFRESH_HZ;
use mimic_common::{parse_ice_server_list, OfferPolicy, StatusBoard, SurfaceConfig};
use mimic_rig::{avatar_asset_url, requested_avatar_url, HeadlessAvatar, RigAdapter};
use mimic_signaling::{spawn_signaling, RtcPeerFactory, SignalingMachine, VideoElementSink};
use mimic_tracking::{
    spawn_tracking, DetectorOptions, ReplayDetector, SharedSubscriber, TrackingHandle,
    VideoElement,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Reads host invocations as JSON lines on stdin and writes outbound
/// messages as JSON lines on stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "mimic-surface")]
struct Args {
    /// Avatar model URL (morph-target query is appended)
    #[arg(long, env = "MIMIC_AVATAR_URL")]
    avatar_url: Option<String>,

    /// Page query string to read `avatarUrl` from, e.g. "?avatarUrl=..."
    #[arg(long, env = "MIMIC_PAGE_QUERY")]
    page_query: Option<String>,

    /// Comma-separated STUN/TURN URLs replacing the default STUN servers
    #[arg(long, env = "MIMIC_ICE_SERVERS")]
    ice_servers: Option<String>,

    #[arg(long, env = "MIMIC_REFRESH_HZ", default_value_t = DEFAULT_REFRESH_HZ)]
    refresh_hz: u32,

    /// Answer a new offer by replacing the live session instead of ignoring it
    #[arg(long)]
    replace_live_session: bool,

    /// Recorded face landmarker output (JSON lines) used as the detector
    #[arg(long, env = "MIMIC_REPLAY")]
    replay: Option<PathBuf>,

    /// Run without a host channel; outbound messages are dropped
    #[arg(long)]
    detached: bool,
}

impl Args {
    fn surface_config(&self) -> Result<SurfaceConfig> {
        let mut config = SurfaceConfig {
            avatar_url: self.requested_avatar_url(),
            refresh_hz: self.refresh_hz,
            offer_policy: if self.replace_live_session {
                OfferPolicy::Replace
            } else {
                OfferPolicy::RejectWhileLive
            },
            ..SurfaceConfig::default()
        };
        if let Some(list) = &self.ice_servers {
            config.ice_servers = parse_ice_server_list(list)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// The page query's `avatarUrl` wins over the flag.
    fn requested_avatar_url(&self) -> Option<String> {
        self.page_query
            .as_deref()
            .and_then(requested_avatar_url)
            .or_else(|| self.avatar_url.clone())
    }
}

fn spawn_status_logger(mut status: watch::Receiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let initial = status.borrow_and_update().clone();
        info!("{}", initial);
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            info!("{}", current);
        }
    })
}

fn start_tracking(
    args: &Args,
    config: &SurfaceConfig,
    video: &VideoElement,
    subscribers: Vec<SharedSubscriber>,
    status: &StatusBoard,
) -> Option<TrackingHandle> {
    let Some(path) = args.replay.clone() else {
        warn!("No face landmarker configured; pass --replay to drive the avatar");
        status.set("Face tracking unavailable: no landmarker configured");
        return None;
    };
    Some(spawn_tracking(
        ReplayDetector::load(path, DetectorOptions::default()),
        video.clone(),
        subscribers,
        status.clone(),
        config.frame_interval(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    mimic_common::init_tracing();

    let args = Args::parse();
    let config = args.surface_config()?;
    let status = StatusBoard::default();
    let _status_log = spawn_status_logger(status.subscribe());

    let bridge = if args.detached {
        HostBridge::detached()
    } else {
        HostBridge::new(Arc::new(StdoutChannel))
    };

    info!(
        "Loading avatar from {}",
        avatar_asset_url(config.avatar_url.as_deref())
    );
    let avatar = HeadlessAvatar::ready_player_me();
    let rig = Arc::new(RigAdapter::new());
    rig.bind(&avatar);

    let video = VideoElement::new();
    let (machine, events) = SignalingMachine::new(
        Arc::new(RtcPeerFactory::from_config(&config)),
        bridge.clone(),
        status.clone(),
        config.offer_policy,
    );
    let machine = machine.with_media_sink(Arc::new(VideoElementSink::new(video.clone())));
    let signaling = spawn_signaling(machine, events);

    let relay: SharedSubscriber = Arc::new(MotionRelay::new(bridge.clone()));
    let rig: SharedSubscriber = rig;
    let subscribers = vec![rig, relay];
    let _tracking = start_tracking(&args, &config, &video, subscribers, &status);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut outcome = Ok(());
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Err(e) = bridge.dispatch_line(line) {
                        warn!("Ignoring host message: {}", e);
                    }
                }
                Ok(None) => {
                    info!("Host closed stdin, shutting down");
                    break;
                }
                Err(e) => {
                    error!("Reading host channel failed: {}", e);
                    outcome = Err(e.into());
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    signaling.shutdown().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_valid_config() {
        let args = Args::try_parse_from(["mimic-surface"]).unwrap();
        let config = args.surface_config().unwrap();
        assert_eq!(config.offer_policy, OfferPolicy::RejectWhileLive);
        assert_eq!(config.ice_servers.len(), 5);
    }

    #[test]
    fn test_custom_ice_servers_and_policy() {
        let args = Args::try_parse_from([
            "mimic-surface",
            "--ice-servers",
            "stun:stun.example.com:3478, turn:turn.example.com:3478",
            "--replace-live-session",
        ])
        .unwrap();
        let config = args.surface_config().unwrap();
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.offer_policy, OfferPolicy::Replace);
    }

    #[test]
    fn test_invalid_refresh_rate_is_rejected() {
        let args = Args::try_parse_from(["mimic-surface", "--refresh-hz", "0"]).unwrap();
        assert!(args.surface_config().is_err());
    }

    #[test]
    fn test_page_query_wins_over_avatar_flag() {
        let args = Args::try_parse_from([
            "mimic-surface",
            "--avatar-url",
            "https://cdn.example/flag.glb",
            "--page-query",
            "?avatarUrl=https://cdn.example/query.glb",
        ])
        .unwrap();
        let config = args.surface_config().unwrap();
        assert_eq!(
            avatar_asset_url(config.avatar_url.as_deref()),
            "https://cdn.example/query.glb?morphTargets=ARKit&textureAtlas=1024"
        );
    }

    #[test]
    fn test_page_query_without_avatar_falls_back_to_flag() {
        let args = Args::try_parse_from([
            "mimic-surface",
            "--avatar-url",
            "https://cdn.example/flag.glb",
            "--page-query",
            "?lang=en",
        ])
        .unwrap();
        let config = args.surface_config().unwrap();
        assert_eq!(config.avatar_url.as_deref(), Some("https://cdn.example/flag.glb"));
    }
}
