//! Lifecycle tests for `Session`, driven tick by tick over a scripted
//! transport.

mod support;

use std::time::Duration;

use mobcast_protocol::PlayerId;
use mobcast_session::{
    ConnectionState, DisconnectReason, FileIdentityStore, MemoryIdentityStore,
    ReconnectConfig, Session, SessionConfig, SessionEvent,
};
use mobcast_transport::{Endpoint, ReadyState};

use support::{
    OpenOutcome, ScriptedTransport, TICK, record, run, session_with, take,
};

fn quiet_config() -> SessionConfig {
    SessionConfig {
        keepalive_interval_ms: 0,
        ..Default::default()
    }
}

fn fast_retry(max_attempts: u32) -> SessionConfig {
    SessionConfig {
        reconnect: ReconnectConfig {
            max_attempts,
            interval_ms: 0,
            timeout_ms: 15_000,
        },
        keepalive_interval_ms: 0,
        ..Default::default()
    }
}

fn count(events: &[SessionEvent], pred: impl Fn(&SessionEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

// =========================================================================
// Connect and identity handshake
// =========================================================================

#[tokio::test]
async fn test_connect_assign_lose_and_recover_keeps_identity() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.endpoint(), Some(&Endpoint::stream("10.0.0.5", 7777)));

    // Backend reports open. No identity yet, so nothing is sent.
    session.tick(TICK).await;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(transport.writes().is_empty());
    assert!(take(&events).is_empty());

    transport.deliver(b"PLAYERID:p-42");
    session.tick(TICK).await;
    assert_eq!(take(&events), vec![SessionEvent::Connected]);
    assert_eq!(store.current(), Some(PlayerId::new("p-42")));

    // Backend fails.
    transport.fail();
    session.tick(TICK).await;
    let seen = take(&events);
    assert!(
        matches!(seen.as_slice(), [SessionEvent::Reconnecting(p)] if p.attempt == 0 && p.max_attempts == 5),
        "got {seen:?}"
    );
    assert_eq!(session.state(), ConnectionState::Reconnecting);

    // First attempt fires after half the 3 s interval; the open is seen
    // on the following tick.
    run(&mut session, 16).await;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(transport.writes(), vec!["RECONNECT:p-42"]);
    assert!(take(&events).is_empty());

    transport.deliver(b"RECONNECT_ACCEPTED:p-42");
    session.tick(TICK).await;
    assert_eq!(take(&events), vec![SessionEvent::Connected]);
    assert_eq!(session.identity(), Some(&PlayerId::new("p-42")));
    assert_eq!(store.current(), Some(PlayerId::new("p-42")));
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test]
async fn test_handshake_grace_announces_without_identity() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    run(&mut session, 20).await;
    assert!(take(&events).is_empty());

    // 2 s after the open on tick 1.
    session.tick(TICK).await;
    assert_eq!(take(&events), vec![SessionEvent::Connected]);
    assert_eq!(session.identity(), None);

    run(&mut session, 10).await;
    assert!(take(&events).is_empty());
}

#[tokio::test]
async fn test_reconnect_accepted_with_new_id_replaces_identity() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::with_identity("old");
    let mut session = session_with(&transport, &store, quiet_config());

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"RECONNECT_ACCEPTED:new");
    session.tick(TICK).await;

    assert_eq!(session.identity(), Some(&PlayerId::new("new")));
    assert_eq!(store.current(), Some(PlayerId::new("new")));
}

#[tokio::test]
async fn test_playerid_while_holding_identity_is_ignored() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::with_identity("mine");
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"PLAYERID:theirs");
    session.tick(TICK).await;

    assert_eq!(session.identity(), Some(&PlayerId::new("mine")));
    assert_eq!(store.current(), Some(PlayerId::new("mine")));
    assert_eq!(take(&events), vec![SessionEvent::Connected]);
}

#[tokio::test]
async fn test_identity_survives_process_restart() {
    let store = MemoryIdentityStore::default();
    {
        let transport = ScriptedTransport::stream();
        let mut session = session_with(&transport, &store, quiet_config());
        session.connect("10.0.0.5", 7777);
        session.tick(TICK).await;
        transport.deliver(b"PLAYERID:abc123");
        session.tick(TICK).await;
    }

    let transport = ScriptedTransport::stream();
    let mut session = session_with(&transport, &store, quiet_config());
    assert_eq!(session.identity(), Some(&PlayerId::new("abc123")));

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    assert_eq!(transport.writes(), vec!["RECONNECT:abc123"]);
}

#[tokio::test]
async fn test_failed_identity_resend_on_open_starts_reconnecting() {
    let store = MemoryIdentityStore::default();
    {
        let transport = ScriptedTransport::stream();
        let mut session = session_with(&transport, &store, quiet_config());
        session.connect("10.0.0.5", 7777);
        session.tick(TICK).await;
        transport.deliver(b"PLAYERID:abc123");
        session.tick(TICK).await;
    }

    let transport = ScriptedTransport::stream();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);
    transport.fail_next_send();

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    session.tick(TICK).await;
    assert_eq!(session.state(), ConnectionState::Reconnecting);
    assert!(transport.writes().is_empty());

    let seen = take(&events);
    assert_eq!(count(&seen, |e| *e == SessionEvent::Connected), 0);
    assert_eq!(
        count(&seen, |e| matches!(e, SessionEvent::Reconnecting(_))),
        1
    );
    assert_eq!(session.identity(), Some(&PlayerId::new("abc123")));
}

#[tokio::test]
async fn test_identity_survives_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    {
        let transport = ScriptedTransport::stream();
        let mut session =
            Session::new(transport.clone(), FileIdentityStore::new(&path), quiet_config());
        session.connect("10.0.0.5", 7777);
        session.tick(TICK).await;
        transport.deliver(b"PLAYERID:abc123");
        session.tick(TICK).await;
    }

    let transport = ScriptedTransport::stream();
    let mut session =
        Session::new(transport.clone(), FileIdentityStore::new(&path), quiet_config());
    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    assert_eq!(transport.writes(), vec!["RECONNECT:abc123"]);
}

#[tokio::test]
async fn test_reconnect_rejected_on_first_connect_disconnects() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::with_identity("stale");
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    assert_eq!(transport.writes(), vec!["RECONNECT:stale"]);

    transport.deliver(b"RECONNECT_REJECTED");
    session.tick(TICK).await;

    assert_eq!(
        take(&events),
        vec![SessionEvent::Disconnected(DisconnectReason::IdentityRejected)]
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.identity(), None);
    assert_eq!(store.current(), None);
}

#[tokio::test]
async fn test_reconnect_rejected_after_recovery_is_reconnection_failed() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::with_identity("p-5");
    let mut session = session_with(&transport, &store, fast_retry(5));
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"RECONNECT_ACCEPTED:p-5");
    session.tick(TICK).await;

    transport.fail();
    session.tick(TICK).await; // Reconnecting, attempt opens at once
    session.tick(TICK).await; // attempt open seen
    assert_eq!(session.state(), ConnectionState::Connected);
    take(&events);

    transport.deliver(b"RECONNECT_REJECTED");
    session.tick(TICK).await;
    assert_eq!(take(&events), vec![SessionEvent::ReconnectionFailed]);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(store.current(), None);
}

// =========================================================================
// Reconnection window
// =========================================================================

#[tokio::test]
async fn test_three_failed_attempts_then_success_ends_connected() {
    let transport = ScriptedTransport::stream();
    transport.queue_outcomes(&[
        OpenOutcome::Fail,
        OpenOutcome::Fail,
        OpenOutcome::Fail,
        OpenOutcome::Succeed,
    ]);
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, fast_retry(5));
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    run(&mut session, 6).await;

    let seen = take(&events);
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(transport.open_count(), 4);
    assert_eq!(count(&seen, |e| matches!(e, SessionEvent::Reconnecting(_))), 1);
    assert_eq!(count(&seen, |e| *e == SessionEvent::ReconnectionFailed), 0);
    assert_eq!(session.reconnect_progress(), None);
}

#[tokio::test]
async fn test_always_failing_backend_gives_up_once() {
    let transport = ScriptedTransport::stream();
    transport.set_fallback(OpenOutcome::Fail);
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, fast_retry(3));
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    run(&mut session, 10).await;

    let seen = take(&events);
    assert_eq!(count(&seen, |e| *e == SessionEvent::ReconnectionFailed), 1);
    assert_eq!(count(&seen, |e| matches!(e, SessionEvent::Disconnected(_))), 0);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    // The initial connect plus two attempts; the third expiry gives up.
    assert_eq!(transport.open_count(), 3);
}

#[tokio::test]
async fn test_window_times_out_before_attempts_run_out() {
    let transport = ScriptedTransport::stream();
    transport.set_fallback(OpenOutcome::Fail);
    let store = MemoryIdentityStore::default();
    let config = SessionConfig {
        reconnect: ReconnectConfig {
            max_attempts: 100,
            interval_ms: 1_000,
            timeout_ms: 3_000,
        },
        ..quiet_config()
    };
    let mut session = session_with(&transport, &store, config);
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    run(&mut session, 30).await;
    assert_eq!(session.state(), ConnectionState::Reconnecting);
    let progress = session.reconnect_progress().unwrap();
    assert_eq!(progress.attempt, 3);
    assert_eq!(progress.elapsed, Duration::from_millis(2_900));

    run(&mut session, 10).await;
    let seen = take(&events);
    assert_eq!(count(&seen, |e| *e == SessionEvent::ReconnectionFailed), 1);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(transport.open_count(), 4);
}

#[tokio::test]
async fn test_attempt_still_opening_is_abandoned_for_a_fresh_one() {
    let transport = ScriptedTransport::stream();
    transport.queue_outcomes(&[
        OpenOutcome::Fail,
        OpenOutcome::Pending,
        OpenOutcome::Succeed,
    ]);
    let store = MemoryIdentityStore::default();
    let config = SessionConfig {
        reconnect: ReconnectConfig {
            interval_ms: 1_000,
            ..Default::default()
        },
        ..quiet_config()
    };
    let mut session = session_with(&transport, &store, config);

    session.connect("10.0.0.5", 7777);
    run(&mut session, 6).await; // attempt 1 at 0.5 s stays pending
    assert_eq!(transport.open_count(), 2);
    let closes = transport.close_count();

    run(&mut session, 10).await; // attempt 2 at 1.5 s
    assert_eq!(transport.open_count(), 3);
    assert_eq!(transport.close_count(), closes + 1);

    session.tick(TICK).await;
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_failure_without_retries_disconnects() {
    let transport = ScriptedTransport::stream();
    transport.set_fallback(OpenOutcome::Fail);
    let store = MemoryIdentityStore::default();
    let config = SessionConfig {
        reconnect: ReconnectConfig::disabled(),
        ..quiet_config()
    };
    let mut session = session_with(&transport, &store, config);
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    run(&mut session, 5).await;

    assert_eq!(
        take(&events),
        vec![SessionEvent::Disconnected(DisconnectReason::ConnectFailed)]
    );
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_transport_loss_without_retries_disconnects() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let config = SessionConfig {
        reconnect: ReconnectConfig::disabled(),
        ..quiet_config()
    };
    let mut session = session_with(&transport, &store, config);
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"PLAYERID:p-1");
    session.tick(TICK).await;
    take(&events);

    transport.fail();
    session.tick(TICK).await;
    assert_eq!(
        take(&events),
        vec![SessionEvent::Disconnected(DisconnectReason::TransportLost)]
    );
    assert_eq!(session.identity(), Some(&PlayerId::new("p-1")));
}

#[tokio::test]
async fn test_send_failure_starts_reconnecting() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.fail_next_send();

    session.send_string("lost").await;
    assert_eq!(session.state(), ConnectionState::Reconnecting);
    // Delivered on the next tick.
    assert!(take(&events).is_empty());
    session.tick(TICK).await;
    assert!(matches!(take(&events).as_slice(), [SessionEvent::Reconnecting(_)]));
}

// =========================================================================
// Inbound dispatch
// =========================================================================

#[tokio::test]
async fn test_pong_produces_no_events() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"PLAYERID:p-1");
    session.tick(TICK).await;
    take(&events);

    transport.deliver(b"PONG");
    session.tick(TICK).await;
    assert!(take(&events).is_empty());
}

#[tokio::test]
async fn test_playernude_emits_one_image_and_keeps_trailing_bytes() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"PLAYERNUDE:p-7:5\nHELLOPLAYERNUDE:p-8:9\nabc");
    session.tick(TICK).await;

    let seen = take(&events);
    let images: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ImageReceived { sender, bytes } => Some((sender.clone(), bytes.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(images, vec![(Some(PlayerId::new("p-7")), b"HELLO".to_vec())]);

    // The rest of the second frame completes it.
    transport.deliver(b"defghi");
    session.tick(TICK).await;
    assert_eq!(
        take(&events),
        vec![SessionEvent::ImageReceived {
            sender: Some(PlayerId::new("p-8")),
            bytes: b"abcdefghi".to_vec()
        }]
    );
}

#[tokio::test]
async fn test_inbound_messages_dispatch_in_order() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"STRING:one\nFROMNUDE:p-2:two\nBOGUS:x\n");
    transport.deliver(b"AVATAR:fox:2\nhiSTRING:three");
    session.tick(TICK).await;

    assert_eq!(
        take(&events),
        vec![
            SessionEvent::Connected,
            SessionEvent::StringReceived { text: "one".into() },
            SessionEvent::ForwardedReceived {
                sender: PlayerId::new("p-2"),
                text: "two".into()
            },
            SessionEvent::AvatarReceived {
                sender: PlayerId::new("fox"),
                bytes: b"hi".to_vec(),
                key: "fox".into()
            },
            SessionEvent::StringReceived { text: "three".into() },
        ]
    );
    assert_eq!(session.frames_dropped(), 1);
    assert_eq!(session.last_activity(), Some(Duration::from_millis(200)));
}

#[tokio::test]
async fn test_unsubscribed_observer_sees_nothing() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let kept = record(&mut session);
    let dropped = std::sync::Arc::new(std::sync::Mutex::new(0usize));
    let counter = std::sync::Arc::clone(&dropped);
    let id = session.subscribe(move |_| *counter.lock().unwrap() += 1);

    assert!(session.unsubscribe(id));
    assert!(!session.unsubscribe(id));

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"STRING:hi");
    session.tick(TICK).await;

    assert_eq!(*dropped.lock().unwrap(), 0);
    assert_eq!(take(&kept).len(), 2);
}

// =========================================================================
// Outbound
// =========================================================================

#[tokio::test]
async fn test_sends_while_disconnected_never_write() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let target = PlayerId::new("p-1");

    session.send_string("a").await;
    session.send_image(b"img").await;
    session.send_image_to_player(&target, b"img").await;
    session.send_text_to_player(&target, "b").await;
    session.forward_message(&target, "c").await;
    session.send_input_state("up").await;
    session.send_gyro([0.0; 3], [0.0; 3]).await;
    session.send_mouse_position(1.0, 2.0).await;
    session.request_device_list().await;

    assert!(transport.writes().is_empty());
    assert_eq!(transport.open_count(), 0);
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_sends_while_connecting_never_write() {
    let transport = ScriptedTransport::stream();
    transport.set_fallback(OpenOutcome::Pending);
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    session.send_string("early").await;
    assert!(transport.writes().is_empty());
}

#[tokio::test]
async fn test_sends_while_connected_write_frames() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let target = PlayerId::new("p-3");

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;

    session.send_string("hi").await;
    session.send_image_to_player(&target, b"ab").await;
    session.send_text_to_player(&target, "psst").await;
    session.forward_message(&target, "fwd").await;
    session.send_input_state("A_DOWN").await;
    session.send_gyro([0.1, 0.2, 0.3], [1.0, -1.0, 9.5]).await;
    session.send_mouse_position(10.4, 20.6).await;
    session.request_device_list().await;

    assert_eq!(
        transport.writes(),
        vec![
            "STRING:hi",
            "TOIMGNUDE:p-3:2\nab",
            "TONUDE:p-3:psst",
            "FORWARD:p-3:fwd",
            "INPUT:A_DOWN",
            "GYRO:G:0.10,0.20,0.30|A:1.00,-1.00,9.50",
            "MOUSE:10,21",
            "GETDEVICES",
        ]
    );
}

#[tokio::test]
async fn test_keepalive_pings_on_interval() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let config = SessionConfig {
        keepalive_interval_ms: 1_000,
        ..Default::default()
    };
    let mut session = session_with(&transport, &store, config);

    session.connect("10.0.0.5", 7777);
    run(&mut session, 12).await;
    assert_eq!(transport.writes(), vec!["PING"]);

    run(&mut session, 10).await;
    assert_eq!(transport.writes(), vec!["PING", "PING"]);
}

// =========================================================================
// Connect requests
// =========================================================================

#[tokio::test]
async fn test_connect_while_active_is_noop() {
    let transport = ScriptedTransport::stream();
    transport.set_fallback(OpenOutcome::Pending);
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());

    session.connect("10.0.0.5", 7777);
    session.connect("10.0.0.6", 7777);
    session.connect_str("10.0.0.7:7777").unwrap();
    assert_eq!(transport.open_count(), 1);
    assert_eq!(session.endpoint(), Some(&Endpoint::stream("10.0.0.5", 7777)));
    assert_eq!(session.state(), ConnectionState::Connecting);
}

#[tokio::test]
async fn test_connect_str_and_deep_link() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());

    assert!(session.connect_str("not-an-address").is_err());
    assert_eq!(session.state(), ConnectionState::Disconnected);

    // A ws:// string keeps only host and port on a stream backend.
    session.connect_str("ws://10.0.0.5:9000/mobile").unwrap();
    assert_eq!(session.endpoint(), Some(&Endpoint::stream("10.0.0.5", 9000)));
    session.disconnect();

    session
        .connect_deep_link("https://play.example/?connect=MTAuMC4wLjU6Nzc3Nw%3D%3D")
        .unwrap();
    assert_eq!(session.endpoint(), Some(&Endpoint::stream("10.0.0.5", 7777)));
}

#[tokio::test]
async fn test_disconnect_keeps_identity_and_endpoint() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    transport.deliver(b"PLAYERID:p-1");
    session.tick(TICK).await;
    take(&events);

    session.disconnect();
    // Delivered without waiting for a tick.
    assert_eq!(
        take(&events),
        vec![SessionEvent::Disconnected(DisconnectReason::Requested)]
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.identity(), Some(&PlayerId::new("p-1")));

    assert!(session.reconnect_last());
    session.tick(TICK).await;
    assert_eq!(transport.writes(), vec!["RECONNECT:p-1"]);
}

#[tokio::test]
async fn test_clear_saved_identity() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::with_identity("p-1");
    let mut session = session_with(&transport, &store, quiet_config());

    session.clear_saved_identity();
    assert_eq!(session.identity(), None);
    assert_eq!(store.current(), None);

    session.connect("10.0.0.5", 7777);
    session.tick(TICK).await;
    assert!(transport.writes().is_empty());
}

#[tokio::test]
async fn test_reconnect_last_without_history_is_false() {
    let transport = ScriptedTransport::stream();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    assert!(!session.reconnect_last());
    assert_eq!(transport.open_count(), 0);
}

// =========================================================================
// Polled backends
// =========================================================================

#[tokio::test]
async fn test_polled_backend_open_is_debounced_and_flaps_ignored() {
    let transport = ScriptedTransport::polled();
    let store = MemoryIdentityStore::default();
    let mut session = session_with(&transport, &store, quiet_config());
    let events = record(&mut session);

    session.connect("10.0.0.5", 7778);
    assert_eq!(session.endpoint().map(Endpoint::url), Some("ws://10.0.0.5:7778/mobile".into()));
    transport.deliver(b"PLAYERID:p-9");

    // Open is only accepted once the 1 s dwell has passed.
    run(&mut session, 9).await;
    assert_eq!(session.state(), ConnectionState::Connecting);

    session.tick(TICK).await;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(take(&events), vec![SessionEvent::Connected]);
    assert_eq!(session.identity(), Some(&PlayerId::new("p-9")));

    // A brief flap inside the dwell is ignored.
    transport.set_state(ReadyState::Closed);
    session.tick(TICK).await;
    transport.set_state(ReadyState::Open);
    session.tick(TICK).await;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(take(&events).is_empty());

    // A lasting close is acted on.
    transport.set_state(ReadyState::Closed);
    run(&mut session, 10).await;
    assert_eq!(session.state(), ConnectionState::Reconnecting);
    assert!(matches!(take(&events).as_slice(), [SessionEvent::Reconnecting(_)]));
}
