//! DuelSession: the synchronous state machine behind a game window.
//!
//! Every input the program reacts to (a local click, a peer message, a timer
//! tick, a connection change) goes through exactly one method on
//! [`DuelSession`].  The method mutates the session and returns a list of
//! [`SessionEffect`]s describing what the outside world must do next: send a
//! message, start or stop a timer, close the link, or tell the user
//! something.
//!
//! The session never touches a socket or a clock itself.  Callers pass the
//! current [`Instant`] in, which keeps every transition deterministic under
//! test.
//!
//! # Phases
//!
//! ```text
//! LocalWaiting ──open──▶ LocalPlaying ──win/lose──▶ LocalWaiting
//!      │ listen / connect
//!      ▼
//! NetListening ──accept──▶ NetConnected ──start or peer ready──▶ NetReady
//!                               ▲                                   │ both ready
//!                               │ result exchanged                  ▼
//!                           NetPlaying ◀──countdown reaches 0── NetStarting
//! ```
//!
//! Any `Net*` phase returns to `LocalWaiting` on `Bye`, an explicit end, a
//! lost connection, or a protocol violation.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mines_core::{
    needs_ack, resolve_race, Board, BoardSize, DuelMessage, DuelOutcome, FinishFlag, MoveOutcome,
    TerminalReport,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by session transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation is not valid in the current phase.
    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: SessionPhase,
    },

    /// The peer sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A message could not be delivered to the peer.
    #[error("send failed: {0}")]
    SendFailed(String),
}

impl SessionError {
    pub fn violation(reason: impl fmt::Display) -> Self {
        SessionError::ProtocolViolation(reason.to_string())
    }
}

// ── Phases and roles ──────────────────────────────────────────────────────────

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    LocalWaiting,
    LocalPlaying,
    NetListening,
    NetConnected,
    NetReady,
    NetStarting,
    NetPlaying,
}

impl SessionPhase {
    pub fn is_local(self) -> bool {
        matches!(self, SessionPhase::LocalWaiting | SessionPhase::LocalPlaying)
    }

    pub fn is_net(self) -> bool {
        !self.is_local()
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::LocalWaiting => "waiting for a local game",
            SessionPhase::LocalPlaying => "playing a local game",
            SessionPhase::NetListening => "listening for a peer",
            SessionPhase::NetConnected => "connected to a peer",
            SessionPhase::NetReady => "waiting for both players to be ready",
            SessionPhase::NetStarting => "counting down to a duel",
            SessionPhase::NetPlaying => "playing a duel",
        };
        f.write_str(name)
    }
}

/// Which end of the connection this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Unset,
    /// Bound the listening endpoint; generates and ships the board.
    Host,
    /// Connected to a host; plays the board it receives.
    Guest,
}

// ── Effects and events ────────────────────────────────────────────────────────

/// Notifications for whoever presents the game to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A log line meant for the user.
    Status(String),
    PhaseChanged(SessionPhase),
    /// The board was reallocated (new game, new size, or a received layout).
    BoardReset { size: BoardSize },
    /// Cells changed on the local board.
    BoardChanged { revealed: u32, marked: i32 },
    /// The peer's counters, as carried by its last progress update.
    PeerProgress { revealed: u32, marked: i32 },
    /// Seconds left before a duel starts; `0` means it has started.
    Countdown { remaining: u32 },
    /// Periodic tick of whichever game timer is running.
    ClockTick { elapsed: Duration },
    LocalGameOver { won: bool, elapsed: Duration },
    DuelFinished {
        outcome: DuelOutcome,
        own: Option<Duration>,
        peer: Option<Duration>,
    },
    NewHighScore { size: BoardSize, elapsed_ms: u64 },
}

/// Work the caller must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    SendToPeer(DuelMessage),
    Notify(SessionEvent),
    /// Start the one-second countdown ticker.
    StartCountdown,
    StopCountdown,
    /// Start the periodic game clock.
    StartClock,
    StopClock,
    /// Start waiting for the peer, bounded by the configured timeout.
    ArmPeerTimeout,
    DisarmPeerTimeout,
    /// Close the peer link and stop listening.
    CloseConnection,
    /// Offer a finished local game to the high score table.
    RecordHighScore { size: BoardSize, elapsed_ms: u64 },
}

fn notify(event: SessionEvent) -> SessionEffect {
    SessionEffect::Notify(event)
}

fn status(text: impl Into<String>) -> SessionEffect {
    SessionEffect::Notify(SessionEvent::Status(text.into()))
}

/// Converts a duration to whole milliseconds for the wire.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Game state shared by local play and networked duels.
#[derive(Debug)]
pub struct DuelSession {
    board: Board,
    size: BoardSize,
    phase: SessionPhase,
    role: Role,
    finish: FinishFlag,
    outcome: DuelOutcome,
    elapsed: Option<Duration>,
    peer_elapsed: Option<Duration>,
    local_ready: bool,
    peer_ready: bool,
    countdown_secs: u32,
    countdown_remaining: u32,
    started_at: Option<Instant>,
}

impl DuelSession {
    /// Creates a session in `LocalWaiting` with a fresh board of `size`.
    pub fn new(size: BoardSize, countdown_secs: u32) -> Self {
        Self {
            board: Board::new(size),
            size,
            phase: SessionPhase::LocalWaiting,
            role: Role::Unset,
            finish: FinishFlag::Pending,
            outcome: DuelOutcome::Unknown,
            elapsed: None,
            peer_elapsed: None,
            local_ready: false,
            peer_ready: false,
            countdown_secs,
            countdown_remaining: 0,
            started_at: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// The preset chosen by the player.  A guest's board can differ while a
    /// received layout is loaded.
    pub fn size(&self) -> BoardSize {
        self.size
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn finish(&self) -> FinishFlag {
        self.finish
    }

    pub fn outcome(&self) -> DuelOutcome {
        self.outcome
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn peer_elapsed(&self) -> Option<Duration> {
        self.peer_elapsed
    }

    pub fn is_local_ready(&self) -> bool {
        self.local_ready
    }

    pub fn is_peer_ready(&self) -> bool {
        self.peer_ready
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    // ── Local actions ─────────────────────────────────────────────────────────

    /// Opens a cell.  The first open on a fresh local board starts the game.
    pub fn open_cell(&mut self, index: usize, now: Instant) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if self.phase == SessionPhase::LocalWaiting && self.board.is_playing() {
            self.started_at = Some(now);
            effects.push(SessionEffect::StartClock);
            self.set_phase(SessionPhase::LocalPlaying, &mut effects);
        }
        if !matches!(self.phase, SessionPhase::LocalPlaying | SessionPhase::NetPlaying) {
            debug!("ignoring open of cell {index} while {}", self.phase);
            return effects;
        }

        let outcome = self.board.open(index);
        self.after_move(outcome, now, &mut effects);
        effects
    }

    /// Toggles a mark.  Allowed before the first open of a local game.
    pub fn mark_cell(&mut self, index: usize, now: Instant) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if !matches!(
            self.phase,
            SessionPhase::LocalWaiting | SessionPhase::LocalPlaying | SessionPhase::NetPlaying
        ) {
            debug!("ignoring mark of cell {index} while {}", self.phase);
            return effects;
        }

        let outcome = self.board.mark(index);
        self.after_move(outcome, now, &mut effects);
        effects
    }

    /// Chords on a revealed cell.
    pub fn explore_cell(&mut self, index: usize, now: Instant) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if !matches!(self.phase, SessionPhase::LocalPlaying | SessionPhase::NetPlaying) {
            debug!("ignoring explore of cell {index} while {}", self.phase);
            return effects;
        }

        let outcome = self.board.explore(index);
        self.after_move(outcome, now, &mut effects);
        effects
    }

    /// Deals a new local board.  Only available outside a duel.
    pub fn new_local_game(&mut self) -> Vec<SessionEffect> {
        if !self.phase.is_local() {
            return vec![status("finish the duel before starting a new local game")];
        }

        let mut effects = vec![SessionEffect::StopClock];
        self.started_at = None;
        self.reset_board(&mut effects);
        self.set_phase(SessionPhase::LocalWaiting, &mut effects);
        effects
    }

    /// Switches to another preset.  Refused once a duel has been started.
    pub fn change_size(&mut self, size: BoardSize) -> Vec<SessionEffect> {
        if !matches!(
            self.phase,
            SessionPhase::LocalWaiting
                | SessionPhase::LocalPlaying
                | SessionPhase::NetListening
                | SessionPhase::NetConnected
        ) {
            return vec![status("cannot change size during a duel")];
        }

        let mut effects = Vec::new();
        if self.phase == SessionPhase::LocalPlaying {
            self.started_at = None;
            effects.push(SessionEffect::StopClock);
        }
        self.size = size;
        self.reset_board(&mut effects);
        if self.phase.is_local() {
            self.set_phase(SessionPhase::LocalWaiting, &mut effects);
        }
        effects
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Checks that the session may start listening or connecting.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidPhase`] outside the local phases.
    pub fn ensure_can_go_online(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.phase.is_local() {
            Ok(())
        } else {
            Err(SessionError::InvalidPhase {
                operation,
                phase: self.phase,
            })
        }
    }

    /// The listening endpoint is bound.
    pub fn listening_started(&mut self, local_addr: SocketAddr) -> Vec<SessionEffect> {
        let mut effects = vec![SessionEffect::StopClock];
        self.started_at = None;
        self.role = Role::Host;
        self.set_phase(SessionPhase::NetListening, &mut effects);
        effects.push(status(format!("listening on {local_addr}")));
        effects
    }

    /// A peer link is up, either accepted (`Host`) or dialled (`Guest`).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidPhase`] when a host is no longer
    /// listening or a guest has left the local phases in the meantime; the
    /// caller must drop the new connection.
    pub fn peer_connected(
        &mut self,
        role: Role,
        peer: SocketAddr,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        let acceptable = match role {
            Role::Host => self.phase == SessionPhase::NetListening,
            Role::Guest => self.phase.is_local(),
            Role::Unset => false,
        };
        if !acceptable {
            return Err(SessionError::InvalidPhase {
                operation: "accept a peer",
                phase: self.phase,
            });
        }

        let mut effects = vec![SessionEffect::StopClock];
        self.started_at = None;
        self.role = role;
        self.clear_duel_state();
        self.set_phase(SessionPhase::NetConnected, &mut effects);
        effects.push(status(format!("connected to {peer}")));
        info!(?role, %peer, "peer connected");
        Ok(effects)
    }

    /// The local player asks to start a duel.
    ///
    /// The host deals a fresh board and ships it; the guest announces it is
    /// ready.  The countdown starts as soon as both sides are ready.
    pub fn start_duel(&mut self, now: Instant) -> Vec<SessionEffect> {
        if !matches!(self.phase, SessionPhase::NetConnected | SessionPhase::NetReady) {
            return vec![status(format!("cannot start a duel while {}", self.phase))];
        }
        if self.local_ready {
            debug!("start requested twice; already waiting for the peer");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.role == Role::Host {
            self.reset_board(&mut effects);
            effects.push(SessionEffect::SendToPeer(DuelMessage::board(&self.board)));
            effects.push(status("board sent to peer"));
        } else {
            effects.push(SessionEffect::SendToPeer(DuelMessage::Ready));
            effects.push(status("ready sent to peer"));
        }

        self.local_ready = true;
        if self.peer_ready {
            self.begin_countdown(now, &mut effects);
        } else {
            self.set_phase(SessionPhase::NetReady, &mut effects);
            effects.push(SessionEffect::ArmPeerTimeout);
        }
        effects
    }

    /// The local player leaves the duel (or stops listening).
    pub fn end_duel(&mut self) -> Vec<SessionEffect> {
        if !self.phase.is_net() {
            return Vec::new();
        }
        let connected = self.phase != SessionPhase::NetListening;
        self.teardown(connected, "disconnected")
    }

    /// The peer link closed or failed without a `Bye`.
    pub fn connection_lost(&mut self) -> Vec<SessionEffect> {
        if !self.phase.is_net() {
            return Vec::new();
        }
        warn!("peer link lost while {}", self.phase);
        self.teardown(false, "connection to peer lost")
    }

    /// Tears the duel down after `error`.
    pub fn abort(&mut self, error: &SessionError) -> Vec<SessionEffect> {
        if !self.phase.is_net() {
            return Vec::new();
        }
        warn!("aborting duel: {error}");
        self.teardown(false, &error.to_string())
    }

    /// The peer did not answer within the configured timeout.
    ///
    /// Only meaningful while this side waits on the peer: ready but not yet
    /// counting down, or finished but without the peer's result.
    pub fn peer_timed_out(&mut self) -> Vec<SessionEffect> {
        let waiting = match self.phase {
            SessionPhase::NetReady => self.local_ready,
            SessionPhase::NetPlaying => self.finish != FinishFlag::Pending,
            _ => false,
        };
        if !waiting {
            return Vec::new();
        }
        self.teardown(true, "peer did not respond in time")
    }

    // ── Peer input ────────────────────────────────────────────────────────────

    /// Applies one message from the peer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ProtocolViolation`] when a received board does
    /// not load.  The caller should follow up with [`abort`](Self::abort).
    pub fn handle_message(
        &mut self,
        msg: DuelMessage,
        now: Instant,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        debug!(kind = msg.kind(), phase = %self.phase, "peer message");

        if let Some(report) = msg.terminal_report() {
            return Ok(self.resolve_terminal(report));
        }

        match msg {
            DuelMessage::Bye => {
                if !self.phase.is_net() {
                    warn!("Bye received outside a duel");
                    return Ok(Vec::new());
                }
                Ok(self.teardown(false, "peer ended the duel"))
            }
            DuelMessage::Ready | DuelMessage::Board(_) => self.peer_ready_received(msg, now),
            DuelMessage::Progress { revealed, marked } => {
                Ok(vec![notify(SessionEvent::PeerProgress { revealed, marked })])
            }
            DuelMessage::Done { .. } | DuelMessage::Fail { .. } | DuelMessage::Ack => Ok(Vec::new()),
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    /// One second of the pre-duel countdown has passed.
    pub fn countdown_tick(&mut self, now: Instant) -> Vec<SessionEffect> {
        if self.phase != SessionPhase::NetStarting {
            return Vec::new();
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        let mut effects = vec![notify(SessionEvent::Countdown {
            remaining: self.countdown_remaining,
        })];
        if self.countdown_remaining == 0 {
            effects.push(SessionEffect::StopCountdown);
            self.start_match(now, &mut effects);
        }
        effects
    }

    /// Periodic clock tick; reports the running timer, if any.
    pub fn clock_tick(&self, now: Instant) -> Vec<SessionEffect> {
        match self.started_at {
            Some(start) => vec![notify(SessionEvent::ClockTick {
                elapsed: now.saturating_duration_since(start),
            })],
            None => Vec::new(),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn set_phase(&mut self, phase: SessionPhase, effects: &mut Vec<SessionEffect>) {
        if self.phase != phase {
            debug!("phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            effects.push(notify(SessionEvent::PhaseChanged(phase)));
        }
    }

    fn reset_board(&mut self, effects: &mut Vec<SessionEffect>) {
        self.board.reset(self.size);
        effects.push(notify(SessionEvent::BoardReset { size: self.size }));
    }

    fn stop_timer(&mut self, now: Instant) -> Duration {
        self.started_at
            .take()
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    fn clear_duel_state(&mut self) {
        self.finish = FinishFlag::Pending;
        self.outcome = DuelOutcome::Unknown;
        self.elapsed = None;
        self.peer_elapsed = None;
        self.local_ready = false;
        self.peer_ready = false;
        self.countdown_remaining = 0;
    }

    fn after_move(&mut self, outcome: MoveOutcome, now: Instant, effects: &mut Vec<SessionEffect>) {
        if !outcome.has_update() {
            return;
        }
        let revealed = u32::try_from(self.board.revealed_safe_count()).unwrap_or(u32::MAX);
        let marked = self.board.marked_count();
        effects.push(notify(SessionEvent::BoardChanged { revealed, marked }));

        match (self.phase, outcome) {
            (SessionPhase::LocalPlaying, MoveOutcome::Won | MoveOutcome::Lost) => {
                self.finish_local(outcome == MoveOutcome::Won, now, effects);
            }
            (SessionPhase::NetPlaying, MoveOutcome::Won | MoveOutcome::Lost) => {
                self.finish_duel_round(outcome == MoveOutcome::Won, now, effects);
            }
            (SessionPhase::NetPlaying, _) if self.finish == FinishFlag::Pending => {
                effects.push(SessionEffect::SendToPeer(DuelMessage::Progress { revealed, marked }));
            }
            _ => {}
        }
    }

    fn finish_local(&mut self, won: bool, now: Instant, effects: &mut Vec<SessionEffect>) {
        let elapsed = self.stop_timer(now);
        self.elapsed = Some(elapsed);
        effects.push(SessionEffect::StopClock);
        self.set_phase(SessionPhase::LocalWaiting, effects);
        effects.push(notify(SessionEvent::LocalGameOver { won, elapsed }));
        if won {
            effects.push(SessionEffect::RecordHighScore {
                size: self.board.size(),
                elapsed_ms: millis(elapsed),
            });
        }
        info!(won, elapsed_ms = millis(elapsed), "local game over");
    }

    fn finish_duel_round(&mut self, won: bool, now: Instant, effects: &mut Vec<SessionEffect>) {
        let elapsed = self.stop_timer(now);
        let elapsed_ms = millis(elapsed);
        self.elapsed = Some(elapsed);
        effects.push(SessionEffect::StopClock);

        if won {
            self.finish = FinishFlag::Succeeded;
            effects.push(SessionEffect::SendToPeer(DuelMessage::Done { elapsed_ms }));
            effects.push(status(format!("board cleared in {elapsed_ms} ms, waiting for peer")));
        } else {
            self.finish = FinishFlag::Failed;
            effects.push(SessionEffect::SendToPeer(DuelMessage::Fail { elapsed_ms }));
            effects.push(status(format!("hit a mine after {elapsed_ms} ms, waiting for peer")));
        }
        effects.push(SessionEffect::ArmPeerTimeout);
    }

    fn peer_ready_received(
        &mut self,
        msg: DuelMessage,
        now: Instant,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        if !matches!(self.phase, SessionPhase::NetConnected | SessionPhase::NetReady) {
            warn!(kind = msg.kind(), "readiness received while {}; ignoring", self.phase);
            return Ok(Vec::new());
        }
        if self.peer_ready {
            debug!("peer announced readiness twice");
            return Ok(Vec::new());
        }

        let mut effects = Vec::new();
        match (&msg, self.role) {
            (DuelMessage::Board(text), Role::Guest) => {
                self.board.load_from_text(text).map_err(SessionError::violation)?;
                effects.push(notify(SessionEvent::BoardReset {
                    size: self.board.size(),
                }));
                effects.push(status("board received from peer"));
            }
            (DuelMessage::Board(_), _) => {
                warn!("host received a board from its guest; treating it as readiness");
            }
            (DuelMessage::Ready, Role::Guest) => {
                warn!("guest received Ready from its host; treating it as readiness");
            }
            _ => effects.push(status("peer is ready")),
        }

        self.peer_ready = true;
        if self.local_ready {
            self.begin_countdown(now, &mut effects);
        } else {
            self.set_phase(SessionPhase::NetReady, &mut effects);
        }
        Ok(effects)
    }

    fn begin_countdown(&mut self, now: Instant, effects: &mut Vec<SessionEffect>) {
        self.finish = FinishFlag::Pending;
        self.outcome = DuelOutcome::Unknown;
        self.elapsed = None;
        self.peer_elapsed = None;
        self.countdown_remaining = self.countdown_secs;

        effects.push(SessionEffect::DisarmPeerTimeout);
        self.set_phase(SessionPhase::NetStarting, effects);
        effects.push(notify(SessionEvent::Countdown {
            remaining: self.countdown_remaining,
        }));

        if self.countdown_remaining == 0 {
            self.start_match(now, effects);
        } else {
            effects.push(SessionEffect::StartCountdown);
        }
    }

    fn start_match(&mut self, now: Instant, effects: &mut Vec<SessionEffect>) {
        self.started_at = Some(now);
        self.set_phase(SessionPhase::NetPlaying, effects);
        effects.push(SessionEffect::StartClock);
        effects.push(status("go!"));
    }

    fn resolve_terminal(&mut self, report: TerminalReport) -> Vec<SessionEffect> {
        if !matches!(self.phase, SessionPhase::NetStarting | SessionPhase::NetPlaying) {
            warn!(?report, "terminal message received while {}; ignoring", self.phase);
            return Vec::new();
        }

        let mut effects = Vec::new();
        let local_ms = self.elapsed.map(millis).unwrap_or(0);
        let outcome = resolve_race(self.finish, local_ms, report);

        if needs_ack(self.finish) {
            effects.push(SessionEffect::SendToPeer(DuelMessage::Ack));
        }
        match report {
            TerminalReport::Done { elapsed_ms } => {
                self.peer_elapsed = Some(Duration::from_millis(elapsed_ms));
                effects.push(status(format!("peer cleared the board in {elapsed_ms} ms")));
            }
            TerminalReport::Fail { elapsed_ms } => {
                self.peer_elapsed = Some(Duration::from_millis(elapsed_ms));
                effects.push(status(format!("peer hit a mine after {elapsed_ms} ms")));
            }
            TerminalReport::Ack => {}
        }

        self.outcome = outcome;
        self.started_at = None;
        self.local_ready = false;
        self.peer_ready = false;
        effects.extend([
            SessionEffect::StopCountdown,
            SessionEffect::StopClock,
            SessionEffect::DisarmPeerTimeout,
        ]);
        self.set_phase(SessionPhase::NetConnected, &mut effects);
        effects.push(notify(SessionEvent::DuelFinished {
            outcome,
            own: self.elapsed,
            peer: self.peer_elapsed,
        }));
        info!(?outcome, "duel finished");
        effects
    }

    fn teardown(&mut self, send_bye: bool, reason: &str) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if send_bye {
            effects.push(SessionEffect::SendToPeer(DuelMessage::Bye));
        }
        effects.extend([
            SessionEffect::StopCountdown,
            SessionEffect::StopClock,
            SessionEffect::DisarmPeerTimeout,
            SessionEffect::CloseConnection,
        ]);

        self.started_at = None;
        self.role = Role::Unset;
        self.clear_duel_state();
        self.reset_board(&mut effects);
        self.set_phase(SessionPhase::LocalWaiting, &mut effects);
        effects.push(status(reason));
        info!("duel torn down: {reason}");
        effects
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
