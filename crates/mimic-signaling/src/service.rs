//! Actor task owning the [`SignalingMachine`] and the host entry points feeding it.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use mimic_bridge::{EntryPoint, EntryRegistration, HostBridge};
use mimic_common::{CandidatePayload, Error, OfferPayload, Result, SignalMessage};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::link::PeerEventReceiver;
use crate::machine::SignalingMachine;
use crate::session::SignalingState;

enum Command {
    Signal(SignalMessage),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the running signaling actor.
///
/// [`shutdown`](Self::shutdown) deregisters the host entry points and closes
/// the session, waiting for both. Dropping the handle does the same without
/// waiting: the actor tears down in the background and then exits.
pub struct SignalingHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SignalingState>,
    registrations: Vec<EntryRegistration>,
    task: Option<JoinHandle<()>>,
}

impl SignalingHandle {
    /// Feeds a message directly, bypassing the bridge entry points.
    pub fn send_signal(&self, message: SignalMessage) -> Result<()> {
        self.commands
            .send(Command::Signal(message))
            .map_err(|_| Error::signaling("signaling task stopped"))
    }

    pub fn state(&self) -> SignalingState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SignalingState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate`.
    pub async fn wait_for_state<F>(&self, predicate: F) -> Option<SignalingState>
    where
        F: FnMut(&SignalingState) -> bool,
    {
        let mut state = self.state.clone();
        let reached = state.wait_for(predicate).await.ok().map(|state| *state);
        reached
    }

    pub async fn shutdown(mut self) {
        self.registrations.clear();
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SignalingHandle {
    fn drop(&mut self) {
        if self.task.take().is_some() {
            let (done_tx, _done_rx) = oneshot::channel();
            if self.commands.send(Command::Shutdown(done_tx)).is_err() {
                debug!("Signaling task already stopped");
            }
        }
    }
}

/// Registers the host entry points, announces readiness and starts the actor.
pub fn spawn_signaling(machine: SignalingMachine, mut events: PeerEventReceiver) -> SignalingHandle {
    let bridge = machine.bridge().clone();
    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(machine.state());

    let registrations = register_entry_points(&bridge, &commands_tx);
    if let Err(e) = bridge.send(&SignalMessage::ReadyNotice) {
        warn!("Failed to announce readiness to host: {}", e);
    }

    let task = tokio::spawn(async move {
        let mut machine = machine;
        info!("Signaling ready, waiting for offer");
        loop {
            tokio::select! {
                command = commands_rx.recv() => match command {
                    Some(Command::Signal(message)) => {
                        let handled = AssertUnwindSafe(machine.handle_signal(message))
                            .catch_unwind()
                            .await;
                        if handled.is_err() {
                            error!("Signaling handler panicked");
                            machine.abort_attempt("signaling handler panicked");
                        }
                    }
                    Some(Command::Shutdown(done)) => {
                        machine.teardown().await;
                        state_tx.send_replace(machine.state());
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        machine.teardown().await;
                        state_tx.send_replace(machine.state());
                        break;
                    }
                },
                Some((session, event)) = events.recv() => {
                    machine.handle_peer_event(session, event).await;
                }
            }
            state_tx.send_replace(machine.state());
        }
    });

    SignalingHandle {
        commands: commands_tx,
        state: state_rx,
        registrations,
        task: Some(task),
    }
}

fn register_entry_points(
    bridge: &HostBridge,
    commands: &mpsc::UnboundedSender<Command>,
) -> Vec<EntryRegistration> {
    let offers = commands.clone();
    let offer_entry = bridge.register(EntryPoint::ReceiveOffer, move |data: Value| {
        match serde_json::from_value::<OfferPayload>(data) {
            Ok(payload) => {
                let sdp = payload.into_sdp();
                if offers.send(Command::Signal(SignalMessage::Offer { sdp })).is_err() {
                    debug!("Signaling stopped, dropping offer");
                }
            }
            Err(e) => warn!("Ignoring malformed offer: {}", e),
        }
    });

    let candidates = commands.clone();
    let candidate_entry = bridge.register(EntryPoint::ReceiveIceCandidate, move |data: Value| {
        match serde_json::from_value::<CandidatePayload>(data) {
            Ok(payload) => match payload.into_candidate() {
                Some(candidate) => {
                    let message = SignalMessage::IceCandidate { candidate };
                    if candidates.send(Command::Signal(message)).is_err() {
                        debug!("Signaling stopped, dropping ICE candidate");
                    }
                }
                None => debug!("Ignoring empty ICE candidate"),
            },
            Err(e) => warn!("Ignoring malformed ICE candidate: {}", e),
        }
    });

    vec![offer_entry, candidate_entry]
}
