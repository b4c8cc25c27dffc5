mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chargeflow::clock::{ClockPhase, SessionClock, Simulation, StopReason};
use chargeflow::error::ChargeflowError;
use chargeflow::estimator::{self, cost_from_energy};
use chargeflow::models::{ChargeMode, Vehicle};
use common::{FakePorts, FakeStore, clock_settings, in_progress, port, vehicle};

const RATE: f64 = 10.0;
const PER_TICK: f64 = 11.0 / 3600.0;

fn build(
    store: &Arc<FakeStore>,
    ports: &Arc<FakePorts>,
    v: &Vehicle,
    mode: ChargeMode,
) -> SessionClock {
    let plan = estimator::plan(v, &port(), mode, RATE).unwrap();
    let session = in_progress(7, Some(plan.duration_minutes));
    SessionClock::new(
        session,
        Simulation::new(v, &plan, RATE),
        store.clone(),
        ports.clone(),
        clock_settings(),
    )
}

#[test]
fn simulation_is_monotonic_capped_and_priced_consistently() {
    for mode in [
        ChargeMode::Time { minutes: 30 },
        ChargeMode::Cost { amount: 40.0 },
        ChargeMode::Percentage { target: 100.0 },
    ] {
        let v = vehicle(48.5);
        let plan = estimator::plan(&v, &port(), mode, RATE).unwrap();
        let mut sim = Simulation::new(&v, &plan, RATE);
        let mut last = sim.current_capacity_kwh;
        for _ in 0..3600 {
            sim.advance();
            assert!(sim.current_capacity_kwh >= last);
            assert!(sim.current_capacity_kwh <= v.battery_capacity_kwh);
            assert!((sim.total_cost - cost_from_energy(sim.energy_used_kwh, RATE)).abs() < 1e-12);
            last = sim.current_capacity_kwh;
        }
        assert!((sim.current_capacity_kwh - 50.0).abs() < 1e-12);
        assert_eq!(sim.stop_condition(), Some(StopReason::BatteryFull));
    }
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_settles_the_session() {
    let store = Arc::new(FakeStore::default());
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 1 });

    clock.start().unwrap();
    assert_eq!(clock.phase(), ClockPhase::Running);

    let outcome = clock.wait_stopped().await.unwrap().unwrap();
    assert_eq!(outcome.reason, StopReason::TimerExpired);
    assert!(outcome.port_released);
    assert_eq!(clock.phase(), ClockPhase::Stopped);

    assert!((outcome.session.energy_used_kwh - 60.0 * PER_TICK).abs() < 1e-9);
    assert!((outcome.session.total_cost - 1.83).abs() < 1e-9);
    assert_eq!(store.finalize_calls(), 1);
    assert_eq!(ports.released(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn percentage_target_stops_before_the_planned_time() {
    let store = Arc::new(FakeStore::default());
    let ports = Arc::new(FakePorts::default());
    let clock = build(
        &store,
        &ports,
        &vehicle(10.0),
        ChargeMode::Percentage { target: 21.0 },
    );

    clock.start().unwrap();
    let outcome = clock.wait_stopped().await.unwrap().unwrap();

    assert_eq!(outcome.reason, StopReason::TargetReached);
    let energy = outcome.session.energy_used_kwh;
    assert!(energy >= 0.5 - 1e-9);
    assert!(energy < 0.5 + PER_TICK);
    assert_eq!(store.finalize_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn full_battery_is_a_universal_ceiling() {
    let store = Arc::new(FakeStore::default());
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(49.99), ChargeMode::Time { minutes: 60 });

    clock.start().unwrap();
    let outcome = clock.wait_stopped().await.unwrap().unwrap();

    assert_eq!(outcome.reason, StopReason::BatteryFull);
    assert!((outcome.session.energy_used_kwh - 0.01).abs() < 1e-9);
    let snapshot = clock.snapshot();
    assert!((snapshot.current_capacity_kwh - 50.0).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn concurrent_stops_finalize_once() {
    let store = Arc::new(FakeStore::default());
    store.finalize_delay_ms.store(2000, Ordering::SeqCst);
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 30 });
    clock.start().unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let (first, second) = tokio::join!(
        clock.stop(StopReason::Manual),
        clock.stop(StopReason::Manual)
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.finalize_calls(), 1);
    assert_eq!(ports.released(), vec![2]);

    // Late callers get the stored outcome too
    let late = clock.stop(StopReason::Manual).await.unwrap();
    assert_eq!(late.session.id, first.session.id);
    assert_eq!(store.finalize_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_stop_racing_timer_expiry_finalizes_once() {
    let store = Arc::new(FakeStore::default());
    store.finalize_delay_ms.store(5000, Ordering::SeqCst);
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 1 });
    clock.start().unwrap();

    // Timer fires at 60 s and the finalize is still in flight at 61 s
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(clock.phase(), ClockPhase::Completing);

    let outcome = clock.stop(StopReason::Manual).await.unwrap();
    assert_eq!(outcome.reason, StopReason::TimerExpired);
    assert_eq!(store.finalize_calls(), 1);
    assert_eq!(ports.released().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sync_pushes_fresh_snapshots() {
    let store = Arc::new(FakeStore::default());
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 10 });
    clock.start().unwrap();

    tokio::time::sleep(Duration::from_secs(95)).await;
    let synced = store.sync_calls();
    assert_eq!(synced.len(), 3);

    let first = synced[0];
    assert!(first.energy_used_kwh >= 29.0 * PER_TICK - 1e-9);
    assert!(first.energy_used_kwh <= 30.0 * PER_TICK + 1e-9);
    assert!((first.current_battery_level - (10.0 + first.energy_used_kwh)).abs() < 1e-9);
    for pair in synced.windows(2) {
        assert!(pair[1].energy_used_kwh > pair[0].energy_used_kwh);
        assert!((pair[1].total_cost - cost_from_energy(pair[1].energy_used_kwh, RATE)).abs() < 1e-12);
    }
}

#[tokio::test(start_paused = true)]
async fn failed_sync_does_not_halt_the_clock() {
    let store = Arc::new(FakeStore::default());
    store.fail_sync.store(true, Ordering::SeqCst);
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 10 });
    clock.start().unwrap();

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(store.sync_calls().len(), 3);
    assert_eq!(clock.phase(), ClockPhase::Running);
    assert!(clock.snapshot().remaining_seconds <= 600 - 94);

    let outcome = clock.stop(StopReason::Manual).await.unwrap();
    assert_eq!(outcome.reason, StopReason::Manual);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_timers_and_leaves_session_open() {
    let store = Arc::new(FakeStore::default());
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 10 });
    clock.start().unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    clock.cancel();
    let frozen = clock.snapshot();
    assert_eq!(frozen.phase, ClockPhase::Stopped);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(clock.snapshot().energy_used_kwh, frozen.energy_used_kwh);
    assert!(store.sync_calls().is_empty());
    assert_eq!(store.finalize_calls(), 0);
    assert!(ports.released().is_empty());
    assert!(clock.wait_stopped().await.is_none());

    let err = clock.stop(StopReason::Manual).await.unwrap_err();
    assert!(matches!(err, ChargeflowError::Validation { .. }));
}

#[tokio::test(start_paused = true)]
async fn finalize_is_retried_once() {
    let store = Arc::new(FakeStore::default());
    store.finalize_failures.store(1, Ordering::SeqCst);
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 10 });
    clock.start().unwrap();

    let outcome = clock.stop(StopReason::Manual).await.unwrap();
    assert_eq!(store.finalize_calls(), 2);
    assert!(outcome.port_released);
}

#[tokio::test(start_paused = true)]
async fn persistent_finalize_failure_keeps_the_port() {
    let store = Arc::new(FakeStore::default());
    store.finalize_failures.store(2, Ordering::SeqCst);
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 10 });
    clock.start().unwrap();

    let err = clock.stop(StopReason::Manual).await.unwrap_err();
    assert!(matches!(err, ChargeflowError::SessionFinalize { .. }));
    assert_eq!(store.finalize_calls(), 2);
    assert!(ports.released().is_empty());
    assert_eq!(clock.phase(), ClockPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn failed_port_release_is_reported_not_raised() {
    let store = Arc::new(FakeStore::default());
    let ports = Arc::new(FakePorts::default());
    ports.fail_release.store(true, Ordering::SeqCst);
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 10 });
    clock.start().unwrap();

    let outcome = clock.stop(StopReason::Manual).await.unwrap();
    assert!(!outcome.port_released);
    assert_eq!(store.finalize_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_every_tick() {
    let store = Arc::new(FakeStore::default());
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 10 });
    let mut rx = clock.subscribe();
    clock.start().unwrap();

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().phase, ClockPhase::Running);
    rx.changed().await.unwrap();
    let snap = *rx.borrow_and_update();
    assert_eq!(snap.remaining_seconds, 599);
    assert!((snap.energy_used_kwh - PER_TICK).abs() < 1e-12);

    assert!(clock.start().is_err());
    clock.cancel();
}

#[tokio::test(start_paused = true)]
async fn abandoned_stop_is_joined_not_repeated() {
    let store = Arc::new(FakeStore::default());
    store.finalize_delay_ms.store(5000, Ordering::SeqCst);
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 30 });
    clock.start().unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let gave_up = tokio::time::timeout(Duration::from_secs(1), clock.stop(StopReason::Manual)).await;
    assert!(gave_up.is_err());
    assert_eq!(clock.phase(), ClockPhase::Completing);

    let outcome = clock.stop(StopReason::Manual).await.unwrap();
    assert_eq!(outcome.reason, StopReason::Manual);
    assert_eq!(store.finalize_calls(), 1);
    assert_eq!(ports.released(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn settling_outlives_a_dropped_stop() {
    let store = Arc::new(FakeStore::default());
    store.finalize_delay_ms.store(5000, Ordering::SeqCst);
    let ports = Arc::new(FakePorts::default());
    let clock = build(&store, &ports, &vehicle(10.0), ChargeMode::Time { minutes: 30 });
    clock.start().unwrap();

    let _ = tokio::time::timeout(Duration::from_millis(10), clock.stop(StopReason::Manual)).await;
    let outcome = clock.wait_stopped().await.unwrap().unwrap();

    assert!(outcome.port_released);
    assert_eq!(clock.phase(), ClockPhase::Stopped);
    assert_eq!(store.finalize_calls(), 1);
    assert_eq!(ports.released(), vec![2]);
}

#[test]
fn resume_keeps_recorded_energy_when_vehicle_lags() {
    let mut session = in_progress(9, Some(60));
    session.energy_used_kwh = 15.0;
    session.total_cost = 150.0;

    let mut sim =
        Simulation::resume(&session, &vehicle(10.0), 11.0, RATE, chrono::Utc::now()).unwrap();
    assert!((sim.energy_used_kwh - 15.0).abs() < 1e-12);
    assert!((sim.total_cost - 150.0).abs() < 1e-12);
    assert!((sim.current_capacity_kwh - 10.0).abs() < 1e-12);

    let mut last = sim.energy_used_kwh;
    for _ in 0..120 {
        sim.advance();
        assert!(sim.energy_used_kwh >= last);
        last = sim.energy_used_kwh;
    }
    assert!((sim.energy_used_kwh - (15.0 + 120.0 * PER_TICK)).abs() < 1e-9);
    assert!((sim.total_cost - cost_from_energy(sim.energy_used_kwh, RATE)).abs() < 1e-12);
}
