mod common;

use std::{cell::RefCell, os::fd::RawFd, rc::Rc};

use common::{calls, readable, recorder, ScriptedPoller};
use fcf::{
    dispatch::{Dispatcher, LoopState, PassOutcome},
    error::DispatchError,
    registry::Registry,
    shutdown::StopToken,
    source::{callback, Callback, CallbackRef, READABLE},
};
use nix::{
    errno::Errno,
    poll::{PollFlags, PollTimeout},
};
use pretty_assertions::assert_eq;

fn dispatcher(poller: ScriptedPoller) -> Dispatcher<ScriptedPoller> {
    Dispatcher::new(poller, PollTimeout::ZERO, StopToken::new())
}

fn entries(log: &common::Calls) -> Vec<(String, RawFd)> {
    log.borrow().clone()
}

fn call(name: &str, fd: RawFd) -> (String, RawFd) {
    (name.to_string(), fd)
}

#[test]
fn ready_gyro_fires_only_its_callback() {
    let log = calls();
    let mut registry = Registry::default();
    registry
        .register_source("gyr", 5, READABLE, recorder("gyr", &log))
        .unwrap();
    registry
        .register_source("acc", 6, READABLE, recorder("acc", &log))
        .unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([Ok(vec![readable(5)])]));
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(1))
    );
    assert_eq!(entries(&log), vec![call("gyr", 5)]);
    assert_eq!(dispatcher.state(), LoopState::Idle);
}

#[test]
fn ready_sources_fire_once_in_snapshot_order() {
    let log = calls();
    let mut registry = Registry::default();
    for fd in 10..16 {
        let name = format!("t{}", fd);
        registry
            .register_source(name.as_str(), fd, READABLE, recorder(&name, &log))
            .unwrap();
    }

    // reported out of order; dispatch still follows the table
    let mut dispatcher = dispatcher(ScriptedPoller::new([Ok(vec![
        readable(14),
        readable(11),
        readable(13),
    ])]));
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(3))
    );
    assert_eq!(
        entries(&log),
        vec![call("t11", 11), call("t13", 13), call("t14", 14)]
    );
}

#[test]
fn group_removed_mid_pass_is_skipped_not_misdirected() {
    let log = calls();
    let mut registry = Registry::default();
    registry
        .register_source("imu", 1, READABLE, recorder("A", &log))
        .unwrap();
    let b_log = Rc::clone(&log);
    let b = callback(move |fd: RawFd, _: PollFlags, registry: &mut Registry| {
        b_log.borrow_mut().push(("B".to_string(), fd));
        assert_eq!(registry.deregister_group("imu"), 3);
    });
    registry.register_source("imu", 2, READABLE, b).unwrap();
    registry
        .register_source("imu", 3, READABLE, recorder("C", &log))
        .unwrap();
    registry
        .register_source("gps", 4, READABLE, recorder("D", &log))
        .unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([Ok(vec![
        readable(1),
        readable(2),
        readable(3),
        readable(4),
    ])]));
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(3))
    );

    // D was compacted into slot 0 and still got its own handle
    assert_eq!(
        entries(&log),
        vec![call("A", 1), call("B", 2), call("D", 4)]
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.source(0).unwrap().handle(), 4);
}

#[test]
fn handle_reregistered_mid_pass_waits_for_the_next_pass() {
    let log = calls();
    let mut registry = Registry::default();
    let reset_log = Rc::clone(&log);
    let reset = callback(move |fd: RawFd, _: PollFlags, registry: &mut Registry| {
        reset_log.borrow_mut().push(("reset".to_string(), fd));
        registry.deregister_group("imu");
        registry
            .register_source("imu", 3, READABLE, recorder("C2", &reset_log))
            .unwrap();
    });
    registry.register_source("ctl", 2, READABLE, reset).unwrap();
    registry
        .register_source("imu", 3, READABLE, recorder("C", &log))
        .unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([
        Ok(vec![readable(2), readable(3)]),
        Ok(vec![readable(3)]),
    ]));
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(1))
    );
    assert_eq!(entries(&log), vec![call("reset", 2)]);

    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(1))
    );
    assert_eq!(entries(&log), vec![call("reset", 2), call("C2", 3)]);
}

#[test]
fn source_added_during_a_pass_first_appears_in_the_next_snapshot() {
    let log = calls();
    let mut registry = Registry::default();
    let add_log = Rc::clone(&log);
    let adder = callback(move |fd: RawFd, _: PollFlags, registry: &mut Registry| {
        add_log.borrow_mut().push(("adder".to_string(), fd));
        if !registry.table().contains_handle(9) {
            registry
                .register_source("late", 9, READABLE, recorder("late", &add_log))
                .unwrap();
        }
    });
    registry.register_source("early", 1, READABLE, adder).unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([
        Ok(vec![readable(1), readable(9)]),
        Ok(vec![readable(9)]),
    ]));
    dispatcher.run_pass(&mut registry).unwrap();
    assert_eq!(entries(&log), vec![call("adder", 1)]);

    dispatcher.run_pass(&mut registry).unwrap();
    assert_eq!(entries(&log), vec![call("adder", 1), call("late", 9)]);
    assert_eq!(dispatcher.poller().waits, vec![vec![1], vec![1, 9]]);
}

#[test]
fn hang_up_deregisters_without_calling_back() {
    let log = calls();
    let mut registry = Registry::default();
    registry
        .register_source("mouse", 7, READABLE, recorder("mouse", &log))
        .unwrap();
    registry
        .register_source("gyr", 8, READABLE, recorder("gyr", &log))
        .unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([Ok(vec![
        (7, PollFlags::POLLIN | PollFlags::POLLHUP),
        (8, PollFlags::POLLNVAL),
    ])]));
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(0))
    );
    assert!(entries(&log).is_empty());
    assert!(registry.is_empty());
}

/// Keeps readiness and hang-ups apart so a test can tell which one fired.
struct Owner {
    ready: Vec<RawFd>,
    hung_up: Vec<(RawFd, bool)>,
}

impl Callback for Owner {
    fn on_ready(&mut self, handle: RawFd, _: PollFlags, _: &mut Registry) {
        self.ready.push(handle);
    }

    fn on_hangup(&mut self, handle: RawFd, readiness: PollFlags, registry: &mut Registry) {
        // already gone from the table by the time the owner hears about it
        let still_registered = registry.table().contains_handle(handle);
        self.hung_up.push((handle, still_registered));
        assert!(readiness.intersects(PollFlags::POLLHUP | PollFlags::POLLERR));
    }
}

#[test]
fn hang_up_is_reported_to_the_owner() {
    let owner = Rc::new(RefCell::new(Owner {
        ready: Vec::new(),
        hung_up: Vec::new(),
    }));
    let mut registry = Registry::default();
    let cb: CallbackRef = owner.clone();
    registry.register_source("gps", 7, READABLE, cb.clone()).unwrap();
    registry.register_source("gps", 8, READABLE, cb).unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([Ok(vec![
        (7, PollFlags::POLLIN | PollFlags::POLLHUP),
        readable(8),
    ])]));
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(1))
    );
    assert_eq!(owner.borrow().hung_up, vec![(7, false)]);
    assert_eq!(owner.borrow().ready, vec![8]);
    assert_eq!(registry.len(), 1);
}

#[test]
fn fatal_poll_error_stops_the_loop() {
    let log = calls();
    let mut registry = Registry::default();
    registry
        .register_source("gyr", 5, READABLE, recorder("gyr", &log))
        .unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([
        Err(Errno::EINVAL),
        Ok(vec![readable(5)]),
    ]));
    let err = dispatcher.run(&mut registry).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Poll {
            errno: Errno::EINVAL,
            ..
        }
    ));
    assert_eq!(dispatcher.state(), LoopState::Stopped);

    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Err(DispatchError::Stopped)
    );
    assert!(entries(&log).is_empty());
    assert_eq!(dispatcher.poller().waits.len(), 1);
}

#[test]
fn interrupted_wait_is_retried() {
    let log = calls();
    let mut registry = Registry::default();
    registry
        .register_source("gyr", 5, READABLE, recorder("gyr", &log))
        .unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([
        Err(Errno::EINTR),
        Ok(vec![readable(5)]),
    ]));
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Interrupted)
    );
    assert_eq!(dispatcher.state(), LoopState::Idle);
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::Dispatched(1))
    );
}

#[test]
fn quiet_pass_times_out() {
    let log = calls();
    let mut registry = Registry::default();
    registry
        .register_source("gyr", 5, READABLE, recorder("gyr", &log))
        .unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::default());
    assert_eq!(
        dispatcher.run_pass(&mut registry),
        Ok(PassOutcome::TimedOut)
    );
    assert!(entries(&log).is_empty());
}

#[test]
fn stop_takes_effect_after_the_pass_completes() {
    let log = calls();
    let stop = StopToken::new();
    let mut registry = Registry::default();

    let stopper_stop = stop.clone();
    let stopper_log = Rc::clone(&log);
    let stopper = callback(move |fd: RawFd, _: PollFlags, _: &mut Registry| {
        stopper_log.borrow_mut().push(("stop".to_string(), fd));
        stopper_stop.request_stop();
    });
    registry.register_source("sigs", 3, READABLE, stopper).unwrap();
    registry
        .register_source("gyr", 5, READABLE, recorder("gyr", &log))
        .unwrap();

    let poller = ScriptedPoller::new([
        Ok(vec![readable(3), readable(5)]),
        Ok(vec![readable(5)]),
    ]);
    let mut dispatcher = Dispatcher::new(poller, PollTimeout::ZERO, stop);
    assert_eq!(dispatcher.run(&mut registry), Ok(()));
    assert_eq!(dispatcher.state(), LoopState::Stopped);
    assert_eq!(entries(&log), vec![call("stop", 3), call("gyr", 5)]);
    assert_eq!(dispatcher.poller().waits.len(), 1);
}

#[test]
fn callbacks_see_their_readiness_recorded() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut registry = Registry::default();
    let seen_by_cb = Rc::clone(&seen);
    let inspect = callback(move |fd: RawFd, flags: PollFlags, registry: &mut Registry| {
        let loc = registry.table().position_of(fd).unwrap();
        let recorded = registry.source(loc).unwrap().last_result();
        seen_by_cb.borrow_mut().push((flags, recorded));
    });
    registry.register_source("gyr", 5, READABLE, inspect).unwrap();

    let mut dispatcher = dispatcher(ScriptedPoller::new([Ok(vec![(
        5,
        PollFlags::POLLPRI,
    )])]));
    dispatcher.run_pass(&mut registry).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![(PollFlags::POLLPRI, PollFlags::POLLPRI)]
    );

    dispatcher.run_pass(&mut registry).unwrap();
    assert!(registry.source(0).unwrap().last_result().is_empty());
}
