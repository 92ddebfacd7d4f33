//! DuelService: the single task that owns a [`DuelSession`].
//!
//! Local commands, network events and timer ticks all arrive here and are
//! applied one at a time, so the session has exactly one writer.  The loop
//! is a `tokio::select!` over:
//!
//! - the command channel fed by [`DuelHandle`],
//! - the network channel fed by the listener, the connector and the link
//!   reader,
//! - the one-second countdown ticker and the game clock (each present only
//!   while the session has asked for it),
//! - the optional peer timeout deadline.
//!
//! Each input goes to the matching `DuelSession` method and the returned
//! [`SessionEffect`]s are carried out in order: sends go to the current
//! [`PeerLink`], timers are created or dropped, and [`SessionEvent`]s are
//! forwarded to the caller's event channel.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use mines_core::{Board, BoardSize, DuelMessage, DuelOutcome, FinishFlag};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::scores::{HighScoreRepository, HighScores};
use crate::application::session::{
    DuelSession, Role, SessionEffect, SessionError, SessionEvent, SessionPhase,
};
use crate::infrastructure::network::peer_link::{
    spawn_connect, NetworkError, NetworkEvent, PeerLink, PeerListener,
};
use crate::infrastructure::storage::config::AppConfig;

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 128;
const NETWORK_CAPACITY: usize = 128;
const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

/// Errors returned by [`DuelHandle`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("duel service has stopped")]
    Stopped,
}

/// Runtime knobs for the service, usually taken from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuelSettings {
    pub default_size: BoardSize,
    pub countdown_secs: u32,
    pub clock_interval: Duration,
    pub max_frame_bytes: usize,
    pub peer_timeout: Option<Duration>,
}

impl Default for DuelSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DuelSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_size: config.game.default_size,
            countdown_secs: config.duel.countdown_secs,
            clock_interval: config.duel.clock_interval(),
            max_frame_bytes: config.duel.max_frame_bytes,
            peer_timeout: config.duel.peer_timeout(),
        }
    }
}

/// Point-in-time copy of the session, for display and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub role: Role,
    pub size: BoardSize,
    pub finish: FinishFlag,
    pub outcome: DuelOutcome,
    pub board: Board,
    pub listen_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
}

#[derive(Debug)]
enum Command {
    Listen(SocketAddr),
    Connect(SocketAddr),
    StartDuel,
    EndDuel,
    Open(usize),
    Mark(usize),
    Explore(usize),
    NewGame,
    ChangeSize(BoardSize),
    HighScores(oneshot::Sender<HighScores>),
    ResetHighScores,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cheap, cloneable front door to a running [`DuelService`].
///
/// Every method only enqueues a command; the effect shows up later on the
/// event channel.  Commands are applied in the order they were sent.
#[derive(Debug, Clone)]
pub struct DuelHandle {
    commands: mpsc::Sender<Command>,
}

impl DuelHandle {
    async fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.commands.send(command).await.map_err(|_| ServiceError::Stopped)
    }

    /// Binds `addr` and waits for a guest.
    pub async fn start_listening(&self, addr: SocketAddr) -> Result<(), ServiceError> {
        self.send(Command::Listen(addr)).await
    }

    /// Dials a host at `addr`.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), ServiceError> {
        self.send(Command::Connect(addr)).await
    }

    pub async fn start_duel(&self) -> Result<(), ServiceError> {
        self.send(Command::StartDuel).await
    }

    pub async fn end_duel(&self) -> Result<(), ServiceError> {
        self.send(Command::EndDuel).await
    }

    pub async fn open_cell(&self, index: usize) -> Result<(), ServiceError> {
        self.send(Command::Open(index)).await
    }

    pub async fn mark_cell(&self, index: usize) -> Result<(), ServiceError> {
        self.send(Command::Mark(index)).await
    }

    pub async fn explore_cell(&self, index: usize) -> Result<(), ServiceError> {
        self.send(Command::Explore(index)).await
    }

    pub async fn new_game(&self) -> Result<(), ServiceError> {
        self.send(Command::NewGame).await
    }

    pub async fn change_size(&self, size: BoardSize) -> Result<(), ServiceError> {
        self.send(Command::ChangeSize(size)).await
    }

    pub async fn high_scores(&self) -> Result<HighScores, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::HighScores(tx)).await?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    pub async fn reset_high_scores(&self) -> Result<(), ServiceError> {
        self.send(Command::ResetHighScores).await
    }

    /// Returns the session state after every earlier command has been applied.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Ends any duel (sending `Bye`) and stops the service.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.send(Command::Shutdown).await
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Owns the session and everything it talks to.
pub struct DuelService {
    session: DuelSession,
    settings: DuelSettings,
    scores: Box<dyn HighScoreRepository>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<SessionEvent>,
    net_tx: mpsc::Sender<NetworkEvent>,
    net_rx: mpsc::Receiver<NetworkEvent>,
    listener: Option<PeerListener>,
    link: Option<PeerLink>,
    connecting: bool,
    countdown: Option<Interval>,
    clock: Option<Interval>,
    peer_deadline: Option<Instant>,
}

impl DuelService {
    /// Creates the service, the handle that drives it, and the receiver of
    /// its [`SessionEvent`]s.  Call [`run`](Self::run) to start it.
    pub fn new(
        settings: DuelSettings,
        scores: Box<dyn HighScoreRepository>,
    ) -> (Self, DuelHandle, mpsc::Receiver<SessionEvent>) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (events, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (net_tx, net_rx) = mpsc::channel(NETWORK_CAPACITY);

        let service = Self {
            session: DuelSession::new(settings.default_size, settings.countdown_secs),
            settings,
            scores,
            commands,
            events,
            net_tx,
            net_rx,
            listener: None,
            link: None,
            connecting: false,
            countdown: None,
            clock: None,
            peer_deadline: None,
        };
        (service, DuelHandle { commands: command_tx }, event_rx)
    }

    /// Runs until [`DuelHandle::shutdown`] or until every handle is dropped.
    pub async fn run(mut self) {
        info!(size = self.settings.default_size.name(), "duel service started");
        if self.scores.was_reset_on_load() {
            self.emit(SessionEvent::Status(
                "high score data was corrupted and has been reset".to_string(),
            ))
            .await;
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = self.net_rx.recv() => self.handle_network(event).await,
                _ = next_tick(&mut self.countdown) => {
                    let effects = self.session.countdown_tick(now());
                    self.apply(effects).await;
                }
                _ = next_tick(&mut self.clock) => {
                    let effects = self.session.clock_tick(now());
                    self.apply(effects).await;
                }
                _ = wait_deadline(self.peer_deadline) => {
                    self.peer_deadline = None;
                    let effects = self.session.peer_timed_out();
                    self.apply(effects).await;
                }
            }
        }

        let effects = self.session.end_duel();
        self.apply(effects).await;
        self.close_connection();
        info!("duel service stopped");
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: Command) {
        debug!(?command, "command");
        let at = now();
        let effects = match command {
            Command::Listen(addr) => {
                if let Some(effects) = self.listen(addr).await {
                    effects
                } else {
                    return;
                }
            }
            Command::Connect(addr) => {
                if let Err(reason) = self.check_can_go_online("connect") {
                    vec![SessionEffect::Notify(SessionEvent::Status(reason))]
                } else {
                    self.connecting = true;
                    spawn_connect(addr, self.net_tx.clone());
                    vec![SessionEffect::Notify(SessionEvent::Status(format!(
                        "connecting to {addr}"
                    )))]
                }
            }
            Command::StartDuel => self.session.start_duel(at),
            Command::EndDuel => self.session.end_duel(),
            Command::Open(index) => self.session.open_cell(index, at),
            Command::Mark(index) => self.session.mark_cell(index, at),
            Command::Explore(index) => self.session.explore_cell(index, at),
            Command::NewGame => self.session.new_local_game(),
            Command::ChangeSize(size) => self.session.change_size(size),
            Command::HighScores(reply) => {
                let _ = reply.send(self.scores.all());
                return;
            }
            Command::ResetHighScores => {
                let text = match self.scores.reset() {
                    Ok(()) => "high scores reset".to_string(),
                    Err(e) => format!("could not reset high scores: {e}"),
                };
                vec![SessionEffect::Notify(SessionEvent::Status(text))]
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                return;
            }
            Command::Shutdown => return,
        };
        self.apply(effects).await;
    }

    fn check_can_go_online(&self, operation: &'static str) -> Result<(), String> {
        self.session
            .ensure_can_go_online(operation)
            .map_err(|e| e.to_string())?;
        if self.connecting {
            return Err("a connection attempt is already in progress".to_string());
        }
        Ok(())
    }

    async fn listen(&mut self, addr: SocketAddr) -> Option<Vec<SessionEffect>> {
        if let Err(reason) = self.check_can_go_online("listen") {
            self.emit(SessionEvent::Status(reason)).await;
            return None;
        }
        match PeerListener::bind(addr, self.net_tx.clone()).await {
            Ok(listener) => {
                let effects = self.session.listening_started(listener.local_addr());
                self.listener = Some(listener);
                Some(effects)
            }
            Err(e) => {
                warn!("{e}");
                self.emit(SessionEvent::Status(e.to_string())).await;
                None
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.session.phase(),
            role: self.session.role(),
            size: self.session.size(),
            finish: self.session.finish(),
            outcome: self.session.outcome(),
            board: self.session.board().clone(),
            listen_addr: self.listener.as_ref().map(PeerListener::local_addr),
            peer_addr: self.link.as_ref().map(PeerLink::peer),
        }
    }

    // ── Network ───────────────────────────────────────────────────────────────

    async fn handle_network(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Incoming { stream, peer } => {
                if self.link.is_some() {
                    debug!("already paired; dropping connection from {peer}");
                    return;
                }
                match self.session.peer_connected(Role::Host, peer) {
                    Ok(effects) => {
                        self.attach(stream, peer);
                        self.apply(effects).await;
                    }
                    Err(e) => debug!("dropping connection from {peer}: {e}"),
                }
            }
            NetworkEvent::Outgoing { peer, result } => {
                self.connecting = false;
                match result {
                    Ok(stream) => match self.session.peer_connected(Role::Guest, peer) {
                        Ok(effects) => {
                            self.attach(stream, peer);
                            self.apply(effects).await;
                        }
                        Err(e) => debug!("discarding connection to {peer}: {e}"),
                    },
                    Err(e) => {
                        warn!("{e}");
                        self.emit(SessionEvent::Status(e.to_string())).await;
                    }
                }
            }
            NetworkEvent::Frame { link_id, text } => {
                if !self.is_current_link(link_id) {
                    debug!("discarding frame from stale link {link_id}");
                    return;
                }
                let result = DuelMessage::parse(&text)
                    .map_err(SessionError::violation)
                    .and_then(|msg| self.session.handle_message(msg, now()));
                let effects = match result {
                    Ok(effects) => effects,
                    Err(e) => self.session.abort(&e),
                };
                self.apply(effects).await;
            }
            NetworkEvent::Closed { link_id, error } => {
                if !self.is_current_link(link_id) {
                    return;
                }
                let effects = match error {
                    Some(e) if e.is_protocol_violation() => {
                        self.session.abort(&SessionError::violation(e))
                    }
                    _ => self.session.connection_lost(),
                };
                self.apply(effects).await;
                // The session may already have been local; the link is dead either way.
                self.close_connection();
            }
            NetworkEvent::SendFailed { link_id, error } => {
                if !self.is_current_link(link_id) {
                    return;
                }
                let effects = self.session.abort(&SessionError::SendFailed(error.to_string()));
                self.apply(effects).await;
                self.close_connection();
            }
        }
    }

    fn attach(&mut self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let link = PeerLink::spawn(
            stream,
            peer,
            self.settings.max_frame_bytes,
            self.net_tx.clone(),
        );
        self.link = Some(link);
    }

    fn is_current_link(&self, link_id: Uuid) -> bool {
        self.link.as_ref().is_some_and(|link| link.id() == link_id)
    }

    fn close_connection(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
    }

    // ── Effects ───────────────────────────────────────────────────────────────

    /// Carries out `effects` in order.  A message that cannot be sent aborts
    /// a duel in progress, and the teardown replaces whatever followed it.
    /// A `Bye` that fails during a teardown leaves the teardown running.
    async fn apply(&mut self, effects: Vec<SessionEffect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                SessionEffect::SendToPeer(msg) => {
                    if let Err(e) = self.send_to_peer(msg) {
                        let teardown = self.session.abort(&SessionError::SendFailed(e.to_string()));
                        if !teardown.is_empty() {
                            queue = teardown.into();
                        }
                    }
                }
                SessionEffect::Notify(event) => self.emit(event).await,
                SessionEffect::StartCountdown => {
                    self.countdown = Some(ticker(COUNTDOWN_PERIOD));
                }
                SessionEffect::StopCountdown => self.countdown = None,
                SessionEffect::StartClock => {
                    self.clock = Some(ticker(self.settings.clock_interval));
                }
                SessionEffect::StopClock => self.clock = None,
                SessionEffect::ArmPeerTimeout => {
                    self.peer_deadline = self.settings.peer_timeout.map(|t| Instant::now() + t);
                }
                SessionEffect::DisarmPeerTimeout => self.peer_deadline = None,
                SessionEffect::CloseConnection => self.close_connection(),
                SessionEffect::RecordHighScore { size, elapsed_ms } => {
                    self.record_high_score(size, elapsed_ms).await;
                }
            }
        }
    }

    fn send_to_peer(&self, msg: DuelMessage) -> Result<(), NetworkError> {
        let Some(link) = &self.link else {
            debug!("no peer link; dropping {}", msg.kind());
            return Ok(());
        };
        let kind = msg.kind();
        link.send(msg).map_err(|e| {
            warn!("could not send {kind}: {e}");
            e
        })
    }

    async fn record_high_score(&mut self, size: BoardSize, elapsed_ms: u64) {
        match self.scores.record(size, elapsed_ms) {
            Ok(true) => self.emit(SessionEvent::NewHighScore { size, elapsed_ms }).await,
            Ok(false) => {}
            Err(e) => {
                warn!("could not save high score: {e}");
                self.emit(SessionEvent::Status(format!("could not save high score: {e}")))
                    .await;
            }
        }
    }

    async fn emit(&mut self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }
}

// ── Timer helpers ─────────────────────────────────────────────────────────────

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Waits for the next tick, or forever when there is no ticker.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scores::MockHighScoreRepository;
    use tokio::time::timeout;

    fn quiet_scores() -> MockHighScoreRepository {
        let mut scores = MockHighScoreRepository::new();
        scores.expect_was_reset_on_load().return_const(false);
        scores
    }

    fn start(scores: MockHighScoreRepository) -> (DuelHandle, mpsc::Receiver<SessionEvent>) {
        let (service, handle, events) = DuelService::new(DuelSettings::default(), Box::new(scores));
        tokio::spawn(service.run());
        (handle, events)
    }

    async fn wait_for<F>(events: &mut mpsc::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("service alive");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("expected event within timeout")
    }

    #[tokio::test]
    async fn test_corrupt_scores_reported_on_start() {
        // Arrange
        let mut scores = MockHighScoreRepository::new();
        scores.expect_was_reset_on_load().return_const(true);

        // Act
        let (_handle, mut events) = start(scores);

        // Assert
        let event = wait_for(&mut events, |_| true).await;
        assert_eq!(
            event,
            SessionEvent::Status("high score data was corrupted and has been reset".to_string())
        );
    }

    #[tokio::test]
    async fn test_local_win_is_recorded_once() {
        // Arrange
        let mut scores = quiet_scores();
        scores
            .expect_record()
            .withf(|size, _| *size == BoardSize::Small)
            .times(1)
            .returning(|_, _| Ok(true));
        let (handle, mut events) = start(scores);
        let board = handle.snapshot().await.unwrap().board;

        // Act
        for i in 0..board.total_cells() {
            if !board.cell(i).unwrap().has_mine() {
                handle.open_cell(i).await.unwrap();
            }
        }

        // Assert
        let event = wait_for(&mut events, |e| matches!(e, SessionEvent::NewHighScore { .. })).await;
        assert!(matches!(event, SessionEvent::NewHighScore { size: BoardSize::Small, .. }));
        assert_eq!(handle.snapshot().await.unwrap().phase, SessionPhase::LocalWaiting);
    }

    #[tokio::test]
    async fn test_reset_high_scores_goes_through_repository() {
        let mut scores = quiet_scores();
        scores.expect_reset().times(1).returning(|| Ok(()));
        let (handle, mut events) = start(scores);

        handle.reset_high_scores().await.unwrap();

        let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Status(_))).await;
        assert_eq!(event, SessionEvent::Status("high scores reset".to_string()));
    }

    #[tokio::test]
    async fn test_high_scores_returns_repository_table() {
        let mut scores = quiet_scores();
        let table = HighScores {
            small: Some(7_000),
            ..HighScores::default()
        };
        scores.expect_all().return_const(table);
        let (handle, _events) = start(scores);

        assert_eq!(handle.high_scores().await.unwrap(), table);
    }

    #[tokio::test]
    async fn test_listen_twice_is_refused() {
        // Arrange
        let (handle, mut events) = start(quiet_scores());
        handle.start_listening("127.0.0.1:0".parse().unwrap()).await.unwrap();
        wait_for(&mut events, |e| *e == SessionEvent::PhaseChanged(SessionPhase::NetListening)).await;

        // Act
        handle.start_listening("127.0.0.1:0".parse().unwrap()).await.unwrap();

        // Assert
        let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Status(s) if s.starts_with("cannot"))).await;
        assert_eq!(
            event,
            SessionEvent::Status("cannot listen while listening for a peer".to_string())
        );
    }

    #[tokio::test]
    async fn test_end_duel_while_listening_closes_listener() {
        let (handle, mut events) = start(quiet_scores());
        handle.start_listening("127.0.0.1:0".parse().unwrap()).await.unwrap();
        wait_for(&mut events, |e| *e == SessionEvent::PhaseChanged(SessionPhase::NetListening)).await;
        assert!(handle.snapshot().await.unwrap().listen_addr.is_some());

        handle.end_duel().await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::LocalWaiting);
        assert!(snapshot.listen_addr.is_none());
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_local_phase() {
        let (handle, mut events) = start(quiet_scores());
        let addr = {
            let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            spare.local_addr().unwrap()
        };

        handle.connect(addr).await.unwrap();

        wait_for(&mut events, |e| matches!(e, SessionEvent::Status(s) if s.starts_with("failed to connect"))).await;
        assert_eq!(handle.snapshot().await.unwrap().phase, SessionPhase::LocalWaiting);
    }

    #[tokio::test]
    async fn test_change_size_reaches_session() {
        let (handle, _events) = start(quiet_scores());

        handle.change_size(BoardSize::Medium).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.size, BoardSize::Medium);
        assert_eq!(snapshot.board.size(), BoardSize::Medium);
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_after_shutdown() {
        let (service, handle, _events) = DuelService::new(DuelSettings::default(), Box::new(quiet_scores()));
        let task = tokio::spawn(service.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(handle.new_game().await, Err(ServiceError::Stopped));
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = AppConfig::default();
        config.duel.peer_timeout_secs = Some(10);
        config.game.default_size = BoardSize::Large;

        let settings = DuelSettings::from(&config);

        assert_eq!(settings.peer_timeout, Some(Duration::from_secs(10)));
        assert_eq!(settings.default_size, BoardSize::Large);
        assert_eq!(settings.clock_interval, Duration::from_millis(200));
    }
}
