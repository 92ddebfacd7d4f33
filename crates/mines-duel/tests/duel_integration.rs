//! Integration tests for duel sessions and the networked duel service.
//!
//! # Purpose
//!
//! These tests exercise the crate through its *public* API the way the
//! headless host uses it.  They verify:
//!
//! - The race exchange between two [`DuelSession`]s wired back to back in
//!   memory, without any sockets.
//! - A complete duel between two [`DuelService`]s over loopback TCP: listen,
//!   connect, ready handshake, countdown, play, result exchange, and `Bye`.
//! - How a guest reacts to a misbehaving host: a frame cut off mid-body, an
//!   oversized length header, an unloadable board, and a plain `Bye`.
//!
//! # The duel handshake
//!
//! ```text
//! Host                                 Guest
//! ────                                 ─────
//! start_listening()                    connect(addr)
//! start_duel() ── "0010…01" (board) ─▶ load board, peer ready
//!            ◀── "Ready" ───────────── start_duel()
//! countdown 3..0                       countdown 3..0
//! play                                 play
//! "done 5000" ───────────────────────▶ pending? reply "gotit 0"
//! ```
//!
//! Misbehaving peers are played by a bare `tokio::net::TcpListener` that
//! writes raw bytes.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mines_core::protocol::{encode_frame, DEFAULT_MAX_FRAME_LEN};
use mines_core::{BoardSize, DuelMessage, DuelOutcome, FinishFlag};
use mines_duel::application::duel_service::{DuelHandle, DuelService, DuelSettings};
use mines_duel::application::scores::{HighScoreError, HighScoreRepository, HighScores};
use mines_duel::application::session::{
    DuelSession, Role, SessionEffect, SessionEvent, SessionPhase,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

// ── Test doubles ──────────────────────────────────────────────────────────────

/// High score store that keeps everything in memory and records each offer.
#[derive(Default)]
struct RecordingScores {
    table: HighScores,
    offers: Arc<Mutex<Vec<(BoardSize, u64)>>>,
}

impl HighScoreRepository for RecordingScores {
    fn all(&self) -> HighScores {
        self.table
    }

    fn record(&mut self, size: BoardSize, elapsed_ms: u64) -> Result<bool, HighScoreError> {
        self.offers.lock().unwrap().push((size, elapsed_ms));
        Ok(self.table.offer(size, elapsed_ms))
    }

    fn reset(&mut self) -> Result<(), HighScoreError> {
        self.table = HighScores::default();
        Ok(())
    }

    fn was_reset_on_load(&self) -> bool {
        false
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(10);

struct Peer {
    handle: DuelHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    offers: Arc<Mutex<Vec<(BoardSize, u64)>>>,
}

/// Starts a service with a one-second countdown.
fn spawn_peer() -> Peer {
    spawn_peer_with(DuelSettings {
        countdown_secs: 1,
        ..DuelSettings::default()
    })
}

/// Starts a service and pumps its events into an unbounded queue so the
/// service never blocks on a slow test.
fn spawn_peer_with(settings: DuelSettings) -> Peer {
    let scores = RecordingScores::default();
    let offers = Arc::clone(&scores.offers);
    let (service, handle, mut rx) = DuelService::new(settings, Box::new(scores));
    tokio::spawn(service.run());

    let (tx, events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if tx.send(event).is_err() {
                break;
            }
        }
    });

    Peer {
        handle,
        events,
        offers,
    }
}

/// Collects events up to and including the first one matching `pred`.
async fn collect_until<F>(events: &mut mpsc::UnboundedReceiver<SessionEvent>, mut pred: F) -> Vec<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    timeout(WAIT, async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("service alive");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("expected event within timeout")
}

async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    collect_until(events, pred)
        .await
        .pop()
        .expect("collect_until returns at least one event")
}

fn is_phase(phase: SessionPhase) -> impl FnMut(&SessionEvent) -> bool {
    move |e| *e == SessionEvent::PhaseChanged(phase)
}

fn is_status(text: &'static str) -> impl FnMut(&SessionEvent) -> bool {
    move |e| matches!(e, SessionEvent::Status(s) if s == text)
}

/// Connects `guest` to a bare listener and returns the raw host socket.
async fn guest_with_raw_host(guest: &mut Peer) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    guest.handle.connect(listener.local_addr().unwrap()).await.unwrap();
    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    wait_for(&mut guest.events, is_phase(SessionPhase::NetConnected)).await;
    socket
}

fn sent(effects: &[SessionEffect]) -> Vec<DuelMessage> {
    effects
        .iter()
        .filter_map(|e| match e {
            SessionEffect::SendToPeer(msg) => Some(msg.clone()),
            _ => None,
        })
        .collect()
}

/// Delivers every message in `effects` to `to`, returning what `to` sends back.
fn relay(effects: &[SessionEffect], to: &mut DuelSession, now: Instant) -> Vec<SessionEffect> {
    sent(effects)
        .into_iter()
        .flat_map(|msg| to.handle_message(msg, now).expect("valid message"))
        .collect()
}

// ── In-memory sessions ────────────────────────────────────────────────────────

/// Host clears the board at 5000 ms, guest hits a mine at 7000 ms.  Both
/// finish before seeing the other's report, so neither side acknowledges and
/// the host wins on both ends.
#[test]
fn test_done_5000_against_fail_7000_host_wins() {
    // Arrange: connect, exchange readiness, run both countdowns out.
    let start = Instant::now();
    let addr: SocketAddr = "127.0.0.1:2211".parse().unwrap();
    let mut host = DuelSession::new(BoardSize::Small, 3);
    let mut guest = DuelSession::new(BoardSize::Small, 3);
    host.listening_started(addr);
    host.peer_connected(Role::Host, addr).unwrap();
    guest.peer_connected(Role::Guest, addr).unwrap();

    let host_start = host.start_duel(start);
    relay(&host_start, &mut guest, start);
    let guest_start = guest.start_duel(start);
    relay(&guest_start, &mut host, start);
    for _ in 0..3 {
        host.countdown_tick(start);
        guest.countdown_tick(start);
    }
    assert_eq!(host.phase(), SessionPhase::NetPlaying);
    assert_eq!(guest.phase(), SessionPhase::NetPlaying);

    // Act: host clears every safe cell; guest opens a mine.
    let host_end = start + Duration::from_millis(5000);
    let safe: Vec<usize> = (0..host.board().total_cells())
        .filter(|&i| !host.board().cell(i).unwrap().has_mine())
        .collect();
    let host_effects: Vec<SessionEffect> = safe
        .into_iter()
        .flat_map(|i| host.open_cell(i, host_end))
        .collect();
    let mine = (0..guest.board().total_cells())
        .find(|&i| guest.board().cell(i).unwrap().has_mine())
        .unwrap();
    let guest_effects = guest.open_cell(mine, start + Duration::from_millis(7000));

    let host_done: Vec<SessionEffect> = host_effects
        .into_iter()
        .filter(|e| matches!(e, SessionEffect::SendToPeer(DuelMessage::Done { .. })))
        .collect();
    let guest_reply = relay(&host_done, &mut guest, start);
    let host_reply = relay(&guest_effects, &mut host, start);

    // Assert
    assert_eq!(sent(&host_done), vec![DuelMessage::Done { elapsed_ms: 5000 }]);
    assert_eq!(sent(&guest_effects), vec![DuelMessage::Fail { elapsed_ms: 7000 }]);
    assert_eq!(host.finish(), FinishFlag::Succeeded);
    assert_eq!(guest.finish(), FinishFlag::Failed);
    assert_eq!(host.outcome(), DuelOutcome::Won);
    assert_eq!(guest.outcome(), DuelOutcome::Lost);
    assert!(sent(&guest_reply).is_empty());
    assert!(sent(&host_reply).is_empty());
    assert_eq!(host.phase(), SessionPhase::NetConnected);
    assert_eq!(guest.phase(), SessionPhase::NetConnected);
}

/// A session that is still playing when the peer reports answers with exactly
/// one acknowledgement, and the acknowledgement settles the reporter's result.
#[test]
fn test_pending_side_acks_once_and_reporter_loses_on_fail() {
    // Arrange: zero-second countdown, both sides playing immediately.
    let now = Instant::now();
    let addr: SocketAddr = "127.0.0.1:2211".parse().unwrap();
    let mut host = DuelSession::new(BoardSize::Small, 0);
    let mut guest = DuelSession::new(BoardSize::Small, 0);
    host.listening_started(addr);
    host.peer_connected(Role::Host, addr).unwrap();
    guest.peer_connected(Role::Guest, addr).unwrap();
    let host_start = host.start_duel(now);
    relay(&host_start, &mut guest, now);
    let guest_start = guest.start_duel(now);
    relay(&guest_start, &mut host, now);

    // Act: host hits a mine while the guest is still playing.
    let mine = (0..host.board().total_cells())
        .find(|&i| host.board().cell(i).unwrap().has_mine())
        .unwrap();
    let host_effects = host.open_cell(mine, now + Duration::from_millis(300));
    let guest_reply = relay(&host_effects, &mut guest, now);
    relay(&guest_reply, &mut host, now);

    // Assert
    let acks = sent(&guest_reply)
        .into_iter()
        .filter(|m| *m == DuelMessage::Ack)
        .count();
    assert_eq!(acks, 1);
    assert_eq!(guest.finish(), FinishFlag::Pending);
    assert_eq!(guest.outcome(), DuelOutcome::Won);
    assert_eq!(host.outcome(), DuelOutcome::Lost);
}

// ── Loopback duel ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_duel_over_loopback() {
    // Arrange: host listens on an ephemeral port, guest connects.
    let mut host = spawn_peer();
    let mut guest = spawn_peer();
    host.handle.start_listening("127.0.0.1:0".parse().unwrap()).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetListening)).await;
    let addr = host.handle.snapshot().await.unwrap().listen_addr.unwrap();

    guest.handle.connect(addr).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetConnected)).await;
    wait_for(&mut guest.events, is_phase(SessionPhase::NetConnected)).await;

    // Act 1: handshake and countdown.
    host.handle.start_duel().await.unwrap();
    wait_for(&mut guest.events, is_status("board received from peer")).await;
    guest.handle.start_duel().await.unwrap();
    wait_for(&mut host.events, |e| *e == SessionEvent::Countdown { remaining: 0 }).await;
    wait_for(&mut guest.events, |e| *e == SessionEvent::Countdown { remaining: 0 }).await;

    let host_view = host.handle.snapshot().await.unwrap();
    let guest_view = guest.handle.snapshot().await.unwrap();
    assert_eq!(host_view.role, Role::Host);
    assert_eq!(guest_view.role, Role::Guest);
    assert_eq!(host_view.board.serialize(), guest_view.board.serialize());

    // Act 2: host clears the board while the guest is idle.
    for i in 0..host_view.board.total_cells() {
        if !host_view.board.cell(i).unwrap().has_mine() {
            host.handle.open_cell(i).await.unwrap();
        }
    }

    // Assert: guest acknowledges and loses, host wins on the acknowledgement.
    let host_result = wait_for(&mut host.events, |e| matches!(e, SessionEvent::DuelFinished { .. })).await;
    let guest_result = wait_for(&mut guest.events, |e| matches!(e, SessionEvent::DuelFinished { .. })).await;
    assert!(matches!(host_result, SessionEvent::DuelFinished { outcome: DuelOutcome::Won, .. }));
    assert!(matches!(guest_result, SessionEvent::DuelFinished { outcome: DuelOutcome::Lost, .. }));
    assert_eq!(host.handle.snapshot().await.unwrap().phase, SessionPhase::NetConnected);
    assert!(host.offers.lock().unwrap().is_empty(), "duel wins are not high scores");

    // Act 3: host leaves.
    host.handle.end_duel().await.unwrap();

    // Assert: guest tears down on Bye.
    wait_for(&mut guest.events, is_status("peer ended the duel")).await;
    let guest_view = guest.handle.snapshot().await.unwrap();
    assert_eq!(guest_view.phase, SessionPhase::LocalWaiting);
    assert_eq!(guest_view.role, Role::Unset);
    assert!(guest_view.peer_addr.is_none());
}

#[tokio::test]
async fn test_peer_progress_reaches_the_other_side() {
    let mut host = spawn_peer();
    let mut guest = spawn_peer();
    host.handle.start_listening("127.0.0.1:0".parse().unwrap()).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetListening)).await;
    let addr = host.handle.snapshot().await.unwrap().listen_addr.unwrap();
    guest.handle.connect(addr).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetConnected)).await;
    guest.handle.start_duel().await.unwrap();
    wait_for(&mut host.events, is_status("peer is ready")).await;
    host.handle.start_duel().await.unwrap();
    wait_for(&mut guest.events, |e| *e == SessionEvent::Countdown { remaining: 0 }).await;

    guest.handle.mark_cell(0).await.unwrap();

    let progress = wait_for(&mut host.events, |e| matches!(e, SessionEvent::PeerProgress { .. })).await;
    assert_eq!(progress, SessionEvent::PeerProgress { revealed: 0, marked: 1 });
}

#[tokio::test]
async fn test_second_guest_is_dropped_while_paired() {
    // Arrange
    let mut host = spawn_peer();
    let mut guest = spawn_peer();
    host.handle.start_listening("127.0.0.1:0".parse().unwrap()).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetListening)).await;
    let addr = host.handle.snapshot().await.unwrap().listen_addr.unwrap();
    guest.handle.connect(addr).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetConnected)).await;

    // Act
    let mut intruder = TcpStream::connect(addr).await.unwrap();
    let mut buf = Vec::new();
    let read = timeout(WAIT, intruder.read_to_end(&mut buf)).await;

    // Assert: the intruder is closed without a word; the host stays paired.
    assert!(matches!(read, Ok(Ok(0))));
    let view = host.handle.snapshot().await.unwrap();
    assert_eq!(view.phase, SessionPhase::NetConnected);
    assert!(view.peer_addr.is_some());
}

/// A large board does not fit a 100-byte frame limit.  The host must report
/// the real cause and must not claim the board went out.
#[tokio::test]
async fn test_board_too_large_for_frame_limit_is_reported_to_host() {
    // Arrange
    let mut host = spawn_peer_with(DuelSettings {
        max_frame_bytes: 100,
        ..DuelSettings::default()
    });
    let mut guest = spawn_peer();
    host.handle.change_size(BoardSize::Large).await.unwrap();
    host.handle.start_listening("127.0.0.1:0".parse().unwrap()).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetListening)).await;
    let addr = host.handle.snapshot().await.unwrap().listen_addr.unwrap();
    guest.handle.connect(addr).await.unwrap();
    wait_for(&mut host.events, is_phase(SessionPhase::NetConnected)).await;

    // Act
    host.handle.start_duel().await.unwrap();

    // Assert
    let seen = collect_until(&mut host.events, |e| matches!(e, SessionEvent::Status(s) if s.starts_with("send failed"))).await;
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::Status(
            "send failed: frame of 480 bytes exceeds the 100-byte limit".to_string()
        ))
    );
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Status(s) if s == "board sent to peer")));
    assert_eq!(host.handle.snapshot().await.unwrap().phase, SessionPhase::LocalWaiting);
    wait_for(&mut guest.events, is_status("connection to peer lost")).await;
}

// ── Misbehaving host ──────────────────────────────────────────────────────────

/// The header promises 100 bytes, 40 arrive, then the socket closes.  The
/// guest must tear down without delivering anything from the partial frame.
#[tokio::test]
async fn test_truncated_frame_tears_down_without_delivery() {
    // Arrange
    let mut guest = spawn_peer();
    let mut host = guest_with_raw_host(&mut guest).await;

    // Act
    host.write_all(&100u32.to_be_bytes()).await.unwrap();
    host.write_all(&[b'0'; 40]).await.unwrap();
    drop(host);

    // Assert
    let seen = collect_until(&mut guest.events, is_status("connection to peer lost")).await;
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::PeerProgress { .. })));
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Status(s) if s == "board received from peer")));
    assert_eq!(guest.handle.snapshot().await.unwrap().phase, SessionPhase::LocalWaiting);
}

#[tokio::test]
async fn test_oversized_frame_is_a_protocol_violation() {
    let mut guest = spawn_peer();
    let mut host = guest_with_raw_host(&mut guest).await;

    host.write_all(&10_000u32.to_be_bytes()).await.unwrap();

    let event = wait_for(&mut guest.events, |e| matches!(e, SessionEvent::Status(s) if s.starts_with("protocol violation"))).await;
    assert!(matches!(event, SessionEvent::Status(s) if s.contains("10000")));
    assert_eq!(guest.handle.snapshot().await.unwrap().phase, SessionPhase::LocalWaiting);
}

#[tokio::test]
async fn test_board_of_unknown_length_is_a_protocol_violation() {
    let mut guest = spawn_peer();
    let mut host = guest_with_raw_host(&mut guest).await;

    let frame = encode_frame(&"0".repeat(100), DEFAULT_MAX_FRAME_LEN).unwrap();
    host.write_all(&frame).await.unwrap();

    wait_for(&mut guest.events, |e| matches!(e, SessionEvent::Status(s) if s.starts_with("protocol violation"))).await;
    let mut rest = Vec::new();
    let read = timeout(WAIT, host.read_to_end(&mut rest)).await;
    assert!(matches!(read, Ok(Ok(_))), "guest must close the socket");
    assert!(rest.is_empty(), "a protocol violation is not answered with Bye");
}

#[tokio::test]
async fn test_bye_from_host_is_not_answered() {
    let mut guest = spawn_peer();
    let mut host = guest_with_raw_host(&mut guest).await;

    host.write_all(&encode_frame("Bye", DEFAULT_MAX_FRAME_LEN).unwrap()).await.unwrap();

    wait_for(&mut guest.events, is_status("peer ended the duel")).await;
    let mut rest = Vec::new();
    timeout(WAIT, host.read_to_end(&mut rest)).await.unwrap().unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_end_duel_sends_bye_then_closes() {
    let mut guest = spawn_peer();
    let mut host = guest_with_raw_host(&mut guest).await;

    guest.handle.end_duel().await.unwrap();

    let mut rest = Vec::new();
    timeout(WAIT, host.read_to_end(&mut rest)).await.unwrap().unwrap();
    assert_eq!(rest, encode_frame("Bye", DEFAULT_MAX_FRAME_LEN).unwrap());
    wait_for(&mut guest.events, is_phase(SessionPhase::LocalWaiting)).await;
}
