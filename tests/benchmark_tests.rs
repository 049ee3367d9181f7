//! Performance benchmarks for state tracking
//!
//! Thresholds are generous; they catch accidental quadratic behavior, not
//! small regressions.

use client::Mirror;
use server::sample::Skirmish;
use server::{DeltaManager, Input, Mode, PacketSender, Session, TurnOutcome, TypeDescriptor};
use shared::{Delta, Packet};
use std::time::Instant;
use tokio::sync::mpsc;

fn unit_type() -> TypeDescriptor {
    TypeDescriptor::record([
        ("id", TypeDescriptor::string()),
        ("health", TypeDescriptor::int()),
        ("x", TypeDescriptor::float()),
        ("y", TypeDescriptor::float()),
    ])
}

fn unit(i: usize) -> Input {
    Input::map([
        ("id", Input::from(format!("u{}", i))),
        ("health", Input::from(100)),
        ("x", Input::from(i as f64)),
        ("y", Input::from(0.5)),
    ])
}

/// Benchmark pushing many records onto a list
#[test]
fn benchmark_list_growth() {
    let mut manager = DeltaManager::new(Mode::Strict);
    let units = manager
        .track("units", &TypeDescriptor::list(unit_type()), Input::list(Vec::<Input>::new()))
        .unwrap();

    let start = Instant::now();
    for i in 0..5_000 {
        manager.push(units, unit(i)).unwrap();
    }
    let duration = start.elapsed();

    println!("Pushed 5000 records in {:?}", duration);
    assert_eq!(manager.len(units).unwrap(), 5_000);
    assert!(duration.as_millis() < 2000);
}

/// Benchmark a list oscillating in length, which must stop allocating
#[test]
fn benchmark_pooled_oscillation() {
    let mut manager = DeltaManager::default();
    let list = manager
        .track("ids", &TypeDescriptor::list(TypeDescriptor::int()), Input::list(0..200))
        .unwrap();
    let nodes = manager.node_count();

    let start = Instant::now();
    for round in 0..500 {
        manager.set_len(list, 50).unwrap();
        manager.set_len(list, 200).unwrap();
        manager.set_index(list, 199, round).unwrap();
        manager.flush();
    }
    let duration = start.elapsed();

    println!("500 shrink/grow rounds in {:?}", duration);
    assert_eq!(manager.node_count(), nodes);
    assert!(duration.as_millis() < 2000);
}

/// Benchmark sparse updates deep in a large tree
#[test]
fn benchmark_sparse_updates() {
    let mut manager = DeltaManager::new(Mode::Strict);
    let units = manager
        .track("units", &TypeDescriptor::list(unit_type()), Input::list((0..1_000).map(unit)))
        .unwrap();
    manager.flush();

    let start = Instant::now();
    for turn in 0..100 {
        for i in (0..1_000).step_by(50) {
            let tracker = manager.index(units, i).unwrap();
            manager.set_key(tracker, "health", 99 - turn).unwrap();
        }
        let delta = manager.take();
        assert_eq!(delta.get("units").and_then(Delta::as_object).map(|o| o.len()), Some(21));
    }
    let duration = start.elapsed();

    println!("100 turns of 20 sparse updates in {:?}", duration);
    assert!(duration.as_millis() < 1000);
}

/// Benchmark encoding and decoding large delta packets
#[test]
fn benchmark_packet_serialization() {
    let mut manager = DeltaManager::default();
    manager
        .track("units", &TypeDescriptor::list(unit_type()), Input::list((0..2_000).map(unit)))
        .unwrap();
    let packet = Packet::Delta {
        turn: 0,
        delta: manager.take(),
    };

    let start = Instant::now();
    for _ in 0..100 {
        let bytes = packet.encode().unwrap();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }
    let duration = start.elapsed();

    println!("100 round trips of a 2000-unit delta in {:?}", duration);
    assert!(duration.as_millis() < 5000);
}

/// Benchmark a whole sample game replicated to a mirror
#[test]
fn benchmark_full_game_replication() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new(Skirmish::new(1, 40, 200), Mode::Strict);
    session.add_sink(PacketSender::new(tx, "1"));

    let start = Instant::now();
    session.start().unwrap();
    while session.run_turn().unwrap() == TurnOutcome::Continue {}
    let mut mirror = Mirror::new();
    while let Ok(bytes) = rx.try_recv() {
        mirror.apply_packet(&bytes).unwrap();
    }
    let duration = start.elapsed();

    println!("{} turns played and replicated in {:?}", session.turn(), duration);
    assert_eq!(mirror.state(), session.manager().snapshot());
    assert!(duration.as_millis() < 2000);
}
