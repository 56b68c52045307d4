//! Adaptive live listener: a push subscription approximated over a pull
//! transport.
//!
//! A self-rescheduling polling loop issues conditional fetches for the
//! workspace document, growing the interval additively while nothing
//! changes, doubling it on transient failures, and snapping back to the
//! floor on any observed change or on a wake signal (tab became visible,
//! network reconnected). The locally computed hash of the decrypted
//! document is the change authority; the remote revalidation token only
//! decides whether a body is transferred.
//!
//! One loop per listener instance; a new cycle drops the previous cycle's
//! in-flight request, so listener state never needs locking.

use crate::client::{FetchOutcome, RemoteDocumentClient};
use crate::config::PollConfig;
use crate::envelope::obfuscate_user_key;
use crate::error::{SyncError, SyncResult};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use vaultsync_crypto::derive_user_key;

/// Host-environment signals the listener reacts to.
///
/// Injected so the listener runs against fake signals in tests; real hosts
/// adapt their visibility and connectivity events to this interface.
pub trait EnvironmentSignal: Send + Sync {
    /// Whether the host surface is currently visible to the user.
    fn is_visible(&self) -> bool;

    /// Notifier fired on hidden-to-visible transitions and on network
    /// reconnects. Each notification triggers one immediate cycle.
    fn wake_handle(&self) -> Arc<Notify>;
}

/// Signal for headless hosts: always visible, never wakes.
#[derive(Default)]
pub struct AlwaysVisible {
    wake: Arc<Notify>,
}

impl EnvironmentSignal for AlwaysVisible {
    fn is_visible(&self) -> bool {
        true
    }

    fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }
}

/// Events delivered to the listener's consumer.
#[derive(Debug)]
pub enum ListenerEvent {
    /// A decrypted document whose content differs from the last delivery.
    Data(serde_json::Value),
    /// A recoverable failure; the listener keeps polling with backoff.
    Error(SyncError),
    /// Authorization was lost. Terminal: the listener has stopped and the
    /// caller must end the local session.
    SessionExpired,
}

#[derive(Debug)]
enum ListenerCommand {
    Stop,
}

/// Handle for stopping a running listener. Dropping it also stops the loop.
#[derive(Clone)]
pub struct ListenerHandle {
    command_tx: mpsc::Sender<ListenerCommand>,
}

impl ListenerHandle {
    /// Stops the listener. Idempotent; no events fire after the loop exits.
    pub async fn stop(&self) {
        let _ = self.command_tx.send(ListenerCommand::Stop).await;
    }
}

/// Polling interval state machine.
///
/// Additive growth for "nothing changed", multiplicative for transient
/// failures (repeated hard failures are a stronger back-off signal), both
/// clamped at the ceiling, with jitter on every scheduled delay so
/// independent listeners do not synchronize their bursts.
struct Backoff {
    current_ms: u64,
    config: PollConfig,
}

impl Backoff {
    fn new(config: PollConfig) -> Self {
        Self {
            current_ms: config.floor_ms,
            config,
        }
    }

    fn reset(&mut self) {
        self.current_ms = self.config.floor_ms;
    }

    fn grow(&mut self) {
        self.current_ms = (self.current_ms + self.config.step_ms).min(self.config.ceiling_ms);
    }

    fn double(&mut self) {
        self.current_ms = self
            .current_ms
            .saturating_mul(2)
            .min(self.config.ceiling_ms);
    }

    fn jittered(&self) -> Duration {
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        Duration::from_millis((self.current_ms as f64 * factor) as u64)
    }
}

/// The polling loop. Created by [`create_live_listener`] and driven by
/// awaiting [`LiveListener::run`] (typically inside `tokio::spawn`).
pub struct LiveListener {
    client: Arc<RemoteDocumentClient>,
    user_id: String,
    env: Arc<dyn EnvironmentSignal>,
    events: mpsc::Sender<ListenerEvent>,
    command_rx: mpsc::Receiver<ListenerCommand>,
    backoff: Backoff,
    last_revalidation: Option<String>,
    last_content_hash: Option<[u8; 32]>,
}

/// Creates a live listener for one user's workspace document.
///
/// Returns the stop handle, the event stream, and the loop itself.
pub fn create_live_listener(
    client: Arc<RemoteDocumentClient>,
    user_id: impl Into<String>,
    env: Arc<dyn EnvironmentSignal>,
) -> (ListenerHandle, mpsc::Receiver<ListenerEvent>, LiveListener) {
    let (command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, event_rx) = mpsc::channel(64);

    let backoff = Backoff::new(client.config().poll.clone());
    let listener = LiveListener {
        client,
        user_id: user_id.into(),
        env,
        events: event_tx,
        command_rx,
        backoff,
        last_revalidation: None,
        last_content_hash: None,
    };

    (ListenerHandle { command_tx }, event_rx, listener)
}

impl LiveListener {
    /// Runs the polling loop until stopped, until authorization is lost,
    /// or until the consumer goes away.
    pub async fn run(mut self) {
        let user_key = obfuscate_user_key(&self.user_id);

        let key = match derive_user_key(&self.user_id) {
            Ok(key) => key,
            Err(e) => {
                warn!(user = %user_key, "listener cannot derive key: {e}");
                let _ = self.events.send(ListenerEvent::Error(e.into())).await;
                return;
            }
        };

        info!(user = %user_key, "live listener started");
        let wake = self.env.wake_handle();
        let mut skip_sleep = false;

        loop {
            if !std::mem::take(&mut skip_sleep) {
                let delay = self.backoff.jittered();
                tokio::select! {
                    cmd = self.command_rx.recv() => {
                        if should_stop(cmd) { break; }
                    }
                    _ = wake.notified() => {
                        // Immediate out-of-schedule cycle at the floor.
                        self.backoff.reset();
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            // Do not burn request budget on a surface nobody is looking at;
            // poll again at the floor once it is worth it.
            if !self.env.is_visible() {
                self.backoff.reset();
                continue;
            }

            let fetch = {
                let client = Arc::clone(&self.client);
                let user_id = self.user_id.clone();
                let token = self.last_revalidation.clone();
                async move { client.fetch_workspace(&user_id, token.as_deref()).await }
            };
            tokio::pin!(fetch);

            let outcome = tokio::select! {
                cmd = self.command_rx.recv() => {
                    if should_stop(cmd) { break; }
                    continue;
                }
                _ = wake.notified() => {
                    // Dropping the pinned future cancels the request; the
                    // cancelled attempt delivers no event.
                    self.backoff.reset();
                    skip_sleep = true;
                    continue;
                }
                outcome = &mut fetch => outcome,
            };

            match outcome {
                Ok(FetchOutcome::Unchanged) | Ok(FetchOutcome::Missing) => {
                    self.backoff.grow();
                }
                Ok(FetchOutcome::Document {
                    envelope,
                    revalidation,
                }) => {
                    // Keep the token even when the hash dedups the delivery,
                    // so the next cycle can still revalidate cheaply.
                    self.last_revalidation = revalidation;

                    match envelope.open(&key) {
                        Ok(document) => {
                            let hash = content_hash(&document);
                            if self.last_content_hash == Some(hash) {
                                // The remote's change signal was coarser than
                                // the content; the local hash is the authority.
                                self.backoff.grow();
                            } else {
                                debug!(user = %user_key, content = %hex::encode(&hash[..8]),
                                    "workspace changed");
                                self.last_content_hash = Some(hash);
                                self.backoff.reset();
                                if self
                                    .events
                                    .send(ListenerEvent::Data(document))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(user = %user_key, "failed to open workspace envelope: {e}");
                            self.backoff.double();
                            if self.events.send(ListenerEvent::Error(e)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) if e.is_session_expired() => {
                    warn!(user = %user_key, "authorization lost, listener stopping: {e}");
                    let _ = self.events.send(ListenerEvent::SessionExpired).await;
                    break;
                }
                Err(e) => {
                    debug!(user = %user_key, "transient poll failure: {e}");
                    self.backoff.double();
                    if self.events.send(ListenerEvent::Error(e)).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!(user = %user_key, "live listener stopped");
    }
}

fn should_stop(cmd: Option<ListenerCommand>) -> bool {
    // A closed command channel means the handle is gone; stop either way.
    matches!(cmd, Some(ListenerCommand::Stop) | None)
}

/// Hash of a decrypted document, used as the change-detection authority.
fn content_hash(document: &serde_json::Value) -> [u8; 32] {
    Sha256::digest(document.to_string().as_bytes()).into()
}
