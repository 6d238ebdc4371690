use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::{CompletedTurn, TurnEngine, TurnOutcome, APOLOGY};
use crate::session::{Outbound, SessionState};

/// Why a session's processing loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The inbound side closed.
    Disconnected,
    /// Delivering an answer failed.
    SendFailed,
}

struct RunningTurn {
    seq: u64,
    cancel: CancellationToken,
    handle: JoinHandle<TurnOutcome>,
}

/// Owns one connection's conversation: starts turns, supersedes them when
/// more input arrives, and delivers at most one answer per input batch.
///
/// Input that arrives while a turn is running cancels that turn, waits for it
/// to unwind, and restarts over everything received since the last delivered
/// answer, joined with newlines in arrival order.
pub struct SessionController<O: Outbound> {
    session_id: String,
    engine: Arc<TurnEngine>,
    outbound: O,
    state: SessionState,
    pending: Vec<String>,
    current: Option<RunningTurn>,
    turns_started: u64,
}

impl<O: Outbound> SessionController<O> {
    pub fn new(session_id: impl Into<String>, engine: Arc<TurnEngine>, outbound: O) -> Self {
        Self {
            session_id: session_id.into(),
            engine,
            outbound,
            state: SessionState::Idle,
            pending: Vec::new(),
            current: None,
            turns_started: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Processes `inbound` until it closes or a send fails.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) -> SessionEnd {
        loop {
            tokio::select! {
                // Completion is polled first so a turn that is already done is
                // delivered rather than cancelled by input arriving alongside it.
                biased;
                joined = join_turn(&mut self.current), if self.current.is_some() => {
                    if let Err(end) = self.on_turn_finished(joined).await {
                        return self.close(end).await;
                    }
                }
                received = inbound.recv() => match received {
                    Some(text) => self.on_input(text, &mut inbound).await,
                    None => return self.close(SessionEnd::Disconnected).await,
                }
            }
        }
    }

    async fn on_input(&mut self, text: String, inbound: &mut mpsc::Receiver<String>) {
        if text.trim().is_empty() {
            debug!("[Session {}] Ignoring empty message", self.session_id);
            return;
        }
        info!("[Session {}] Received: {:?}", self.session_id, text);

        if let Some(turn) = self.current.take() {
            self.set_state(SessionState::Cancelling);
            supersede(&self.session_id, turn).await;
            self.pending.push(text);

            // Whatever queued up while the old turn unwound joins this batch.
            while let Ok(more) = inbound.try_recv() {
                if !more.trim().is_empty() {
                    self.pending.push(more);
                }
            }
        } else {
            self.pending.push(text);
        }

        self.start_turn();
    }

    fn start_turn(&mut self) {
        let input = self.pending.join("\n");
        let cancel = CancellationToken::new();

        self.turns_started += 1;
        let seq = self.turns_started;

        let engine = self.engine.clone();
        let session_id = self.session_id.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { engine.run(&session_id, &input, &token).await });

        debug!("[Session {}] Started turn #{} over {} message(s)", self.session_id, seq, self.pending.len());
        self.current = Some(RunningTurn { seq, cancel, handle });
        self.set_state(SessionState::Running);
    }

    async fn on_turn_finished(&mut self, joined: Result<TurnOutcome, JoinError>) -> Result<(), SessionEnd> {
        let Some(turn) = self.current.take() else {
            return Ok(());
        };
        self.set_state(SessionState::Idle);

        let completed = match joined {
            Ok(TurnOutcome::Completed(completed)) if !turn.cancel.is_cancelled() => completed,
            Ok(_) => {
                debug!("[Session {}] Turn #{} ended cancelled, keeping input", self.session_id, turn.seq);
                return Ok(());
            }
            Err(e) => {
                error!("[Session {}] Turn #{} failed: {}", self.session_id, turn.seq, e);
                CompletedTurn::new(&self.session_id, &self.pending.join("\n"), APOLOGY)
            }
        };

        let answer = self.engine.commit(completed).await;
        self.pending.clear();

        if self.outbound.send_text(answer).await.is_err() {
            warn!("[Session {}] Failed to deliver answer of turn #{}", self.session_id, turn.seq);
            return Err(SessionEnd::SendFailed);
        }
        info!("[Session {}] Delivered answer of turn #{}", self.session_id, turn.seq);
        Ok(())
    }

    async fn close(mut self, end: SessionEnd) -> SessionEnd {
        if let Some(turn) = self.current.take() {
            turn.cancel.cancel();
            if let Err(e) = turn.handle.await {
                warn!("[Session {}] Turn #{} failed during shutdown: {}", self.session_id, turn.seq, e);
            }
        }
        self.pending.clear();
        self.set_state(SessionState::Closed);
        info!("[Session {}] Session ended ({:?})", self.session_id, end);
        end
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            debug!("[Session {}] {} -> {}", self.session_id, self.state, next);
            self.state = next;
        }
    }
}

async fn supersede(session_id: &str, turn: RunningTurn) {
    info!("[Session {}] Cancelling turn #{} for newer input", session_id, turn.seq);
    turn.cancel.cancel();

    match turn.handle.await {
        Ok(TurnOutcome::Cancelled) => {}
        Ok(TurnOutcome::Completed(_)) => {
            debug!("[Session {}] Discarding answer of superseded turn #{}", session_id, turn.seq);
        }
        Err(e) => warn!("[Session {}] Superseded turn #{} failed: {}", session_id, turn.seq, e),
    }
}

async fn join_turn(current: &mut Option<RunningTurn>) -> Result<TurnOutcome, JoinError> {
    match current {
        Some(turn) => (&mut turn.handle).await,
        None => std::future::pending().await,
    }
}
