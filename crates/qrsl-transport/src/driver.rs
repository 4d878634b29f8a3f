//! Per-session actor.
//!
//! Each [`SessionHandle`] owns a task that holds the [`SecureSession`]
//! exclusively. Inbound frames, application sends and timer expiry are
//! serialized through that task, so the session never needs a lock. Steps
//! that sign, verify or agree keys run on the blocking pool.

use crate::error::{Error, Result};
use crate::transport::Transport;
use qrsl_core::{SecurePacket, SecureSession, SessionOutput, SessionState};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Session activity reported to the owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A session key was installed (handshake or rekey).
    Established {
        /// Remote peer.
        peer_id: String,
        /// Identifier of the new key.
        key_id: String,
    },
    /// Decrypted application data.
    Message {
        /// Remote peer.
        peer_id: String,
        /// Plaintext.
        data: Vec<u8>,
    },
    /// A rekey cycle was abandoned; the old key stays in use.
    RekeyAbandoned {
        /// Remote peer.
        peer_id: String,
        /// Requests sent in the abandoned cycle.
        attempts: u32,
    },
    /// The session failed.
    Failed {
        /// Remote peer.
        peer_id: String,
        /// Failure description.
        reason: String,
    },
    /// The session was closed locally.
    Closed {
        /// Remote peer.
        peer_id: String,
    },
}

type Reply = oneshot::Sender<Result<()>>;

/// A session handed back from one step, with the step's outcome and the
/// caller waiting on it, if any.
type Step = (SecureSession, (qrsl_core::Result<Vec<SessionOutput>>, Option<Reply>));

enum Command {
    Inbound(Vec<u8>),
    Send(Vec<u8>, Reply),
    Heartbeat(Reply),
    Close,
}

/// Cloneable sending side of a session actor.
#[derive(Clone)]
pub(crate) struct SessionSender {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionSender {
    pub(crate) fn deliver(&self, frame: Vec<u8>) -> Result<()> {
        self.commands
            .send(Command::Inbound(frame))
            .map_err(|_| Error::ChannelClosed)
    }

    pub(crate) async fn send(&self, data: Vec<u8>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send(data, reply))
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    pub(crate) async fn heartbeat(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Heartbeat(reply))
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }
}

/// Owner's handle to a running session.
pub struct SessionHandle {
    peer_id: String,
    sender: SessionSender,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Start driving `session` over `transport`.
    ///
    /// The transport is assumed connected: the handshake starts immediately.
    /// Must be called within a tokio runtime.
    pub fn spawn(
        session: SecureSession,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let peer_id = session.peer_id().to_string();
        let (commands, inbox) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(session.state());
        let actor = Actor {
            peer_id: peer_id.clone(),
            transport,
            events,
            state: state_tx,
        };
        let task = tokio::spawn(actor.run(session, inbox));
        Self {
            peer_id,
            sender: SessionSender { commands },
            state,
            task,
        }
    }

    /// Remote peer.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Last state published by the session task.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Queue an inbound frame for the session.
    pub fn deliver(&self, frame: Vec<u8>) -> Result<()> {
        self.sender.deliver(frame)
    }

    /// Encrypt and send application data.
    pub async fn send(&self, data: Vec<u8>) -> Result<()> {
        self.sender.send(data).await
    }

    /// Send a heartbeat outside the regular interval.
    pub async fn heartbeat(&self) -> Result<()> {
        self.sender.heartbeat().await
    }

    /// Wait until the session is established.
    ///
    /// # Errors
    /// `ConnectionClosed` if the session ended before establishing.
    pub async fn established(&self) -> Result<()> {
        wait_established(self.watch_state()).await
    }

    /// Close the session and wait for its task to finish.
    pub async fn close(self) {
        let _ = self.sender.commands.send(Command::Close);
        if let Err(e) = self.task.await {
            warn!(peer = %self.peer_id, error = %e, "Session task ended abnormally");
        }
    }

    pub(crate) fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

pub(crate) async fn wait_established(mut state: watch::Receiver<SessionState>) -> Result<()> {
    let reached = state
        .wait_for(|s| s.is_established() || s.is_terminal())
        .await
        .map(|s| *s)
        .unwrap_or(SessionState::Closed);
    if reached.is_established() {
        Ok(())
    } else {
        Err(qrsl_core::Error::ConnectionClosed.into())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("peer_id", &self.peer_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct Actor {
    peer_id: String,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
}

/// Session clock derived from tokio's, so paused test time drives timers.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Run `step` against the session on the blocking pool and hand it back.
async fn offload<T, F>(session: SecureSession, step: F) -> Result<(SecureSession, T)>
where
    F: FnOnce(&mut SecureSession) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut session = session;
        let out = step(&mut session);
        (session, out)
    })
    .await
    .map_err(|e| Error::TransportUnavailable(format!("crypto worker failed: {}", e)))
}

impl Actor {
    async fn run(self, session: SecureSession, mut inbox: mpsc::UnboundedReceiver<Command>) {
        let mut session = match offload(session, |s| s.on_transport_ready(now())).await {
            Ok((session, result)) => match self.settle(session, result).await {
                Some(session) => session,
                None => return,
            },
            Err(e) => {
                self.report_lost(e);
                return;
            }
        };

        loop {
            let deadline = session.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            let step: Result<Step> = tokio::select! {
                command = inbox.recv() => match command {
                    Some(Command::Inbound(frame)) => match SecurePacket::decode(&frame) {
                        Ok(packet) => offload(session, move |s| (s.handle_packet(packet, now()), None)).await,
                        Err(e) => {
                            warn!(peer = %self.peer_id, error = %e, "Dropping undecodable frame");
                            continue;
                        }
                    },
                    Some(Command::Send(data, reply)) => {
                        offload(session, move |s| (s.send_message(&data, now()), Some(reply))).await
                    }
                    Some(Command::Heartbeat(reply)) => {
                        let result = session.send_heartbeat(now());
                        Ok((session, (result, Some(reply))))
                    }
                    Some(Command::Close) | None => {
                        self.shutdown(session);
                        return;
                    }
                },
                _ = timer => offload(session, |s| (s.poll(now()), None)).await,
            };

            let (returned, (result, reply)) = match step {
                Ok(step) => step,
                Err(e) => {
                    self.report_lost(e);
                    return;
                }
            };
            let (result, outcome) = match result {
                Ok(outputs) => (Ok(outputs), Ok(())),
                Err(e) if reply.is_some() => (Ok(Vec::new()), Err(e.into())),
                Err(e) => (Err(e), Ok(())),
            };
            let live = self.settle(returned, result).await;
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
            session = match live {
                Some(session) => session,
                None => return,
            };
        }
    }

    /// Carry out the outputs of one step. Returns the session while it is
    /// still live.
    async fn settle(
        &self,
        mut session: SecureSession,
        result: qrsl_core::Result<Vec<SessionOutput>>,
    ) -> Option<SecureSession> {
        let outputs = match result {
            Ok(outputs) => outputs,
            Err(e) => {
                debug!(peer = %self.peer_id, error = %e, "Session step rejected");
                Vec::new()
            }
        };

        self.state.send_replace(session.state());
        for output in outputs {
            match output {
                SessionOutput::Send(packet) => {
                    let sent = match packet.encode() {
                        Ok(frame) => self.transport.send(frame).await,
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = sent {
                        let failed = session.fail(format!("transport: {}", e));
                        self.state.send_replace(session.state());
                        for output in failed {
                            self.emit_terminal(output);
                        }
                        break;
                    }
                }
                SessionOutput::Deliver(data) => self.emit(SessionEvent::Message {
                    peer_id: self.peer_id.clone(),
                    data,
                }),
                SessionOutput::Established { key_id } => {
                    info!(peer = %self.peer_id, key_id = %key_id, "Session key installed");
                    self.emit(SessionEvent::Established {
                        peer_id: self.peer_id.clone(),
                        key_id,
                    });
                }
                SessionOutput::RekeyAbandoned { attempts } => self.emit(SessionEvent::RekeyAbandoned {
                    peer_id: self.peer_id.clone(),
                    attempts,
                }),
                failed @ SessionOutput::Failed(_) => self.emit_terminal(failed),
            }
        }

        if session.state().is_terminal() {
            None
        } else {
            Some(session)
        }
    }

    fn shutdown(&self, mut session: SecureSession) {
        session.close();
        self.state.send_replace(session.state());
        debug!(peer = %self.peer_id, "Session closed");
        self.emit(SessionEvent::Closed {
            peer_id: self.peer_id.clone(),
        });
    }

    fn report_lost(&self, error: Error) {
        warn!(peer = %self.peer_id, error = %error, "Session lost");
        self.state.send_replace(SessionState::Failed);
        self.emit(SessionEvent::Failed {
            peer_id: self.peer_id.clone(),
            reason: error.to_string(),
        });
    }

    fn emit_terminal(&self, output: SessionOutput) {
        if let SessionOutput::Failed(reason) = output {
            self.emit(SessionEvent::Failed {
                peer_id: self.peer_id.clone(),
                reason,
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The owner may have stopped listening; the session keeps running.
        let _ = self.events.send(event);
    }
}
