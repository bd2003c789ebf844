//! End-to-end coupling scenarios driven over in-memory channels.
//!
//! Parallel and multi schedules run with both (all) participants in
//! process, interleaved in the order a blocking transport would enforce.
//! Serial schedules are driven single-sided against a scripted peer
//! endpoint, because their trailing receives pair with the peer's *next*
//! advance.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::DVector;
use tandem_scheme::acceleration::Acceleration;
use tandem_scheme::{
    ConvergenceMeasure, CouplingScheme, DataSpec, PeerLink, SchemeConfig, SchemeError,
    SharedDatum,
};
use tandem_transport::{Channel, InMemoryChannel};
use tandem_types::{Action, DataId, MeshId};

// ── Test doubles ─────────────────────────────────────────────────────

/// Converges once `measure` has been called `threshold` times in the
/// current series.
struct ConvergeAfter {
    threshold: u32,
    calls: u32,
    converged: bool,
    residual: f64,
}

impl ConvergeAfter {
    fn new(threshold: u32) -> Box<Self> {
        Box::new(Self {
            threshold,
            calls: 0,
            converged: false,
            residual: 1.0,
        })
    }

    fn never() -> Box<Self> {
        Self::new(u32::MAX)
    }
}

impl ConvergenceMeasure for ConvergeAfter {
    fn new_series(&mut self) {
        self.calls = 0;
        self.converged = false;
    }

    fn measure(&mut self, _previous: &DVector<f64>, _current: &DVector<f64>) {
        self.calls += 1;
        self.converged = self.calls >= self.threshold;
        self.residual = 1.0 / f64::from(self.calls);
    }

    fn has_converged(&self) -> bool {
        self.converged
    }

    fn residual(&self) -> f64 {
        self.residual
    }

    fn abbreviation(&self) -> &str {
        "ResAbs"
    }

    fn describe(&self, data_name: &str) -> String {
        format!("residual for {data_name}: {}", self.residual)
    }
}

#[derive(Default)]
struct AccelerationLog {
    initialized: u32,
    accelerated: u32,
    converged: u32,
}

/// Records calls; scales working samples so effects are observable.
struct RecordingAcceleration {
    log: Rc<RefCell<AccelerationLog>>,
}

impl Acceleration for RecordingAcceleration {
    fn initialize(&mut self, _data: &[SharedDatum]) -> Result<(), SchemeError> {
        self.log.borrow_mut().initialized += 1;
        Ok(())
    }

    fn accelerate(&mut self, data: &[SharedDatum]) -> Result<(), SchemeError> {
        self.log.borrow_mut().accelerated += 1;
        for datum in data {
            let mut datum = datum.borrow_mut();
            let relaxed = datum.values() * 0.5;
            datum.set_values(relaxed.as_slice());
        }
        Ok(())
    }

    fn iterations_converged(&mut self, _data: &[SharedDatum]) {
        self.log.borrow_mut().converged += 1;
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn scalar(id: i32, name: &str) -> DataSpec {
    DataSpec::scalar(DataId::new(id), name, MeshId::new(0), 1)
}

/// Phase interleaving a blocking transport would enforce for a parallel
/// pair: the first participant sends, the second turns the data around.
fn advance_pair(first: &mut CouplingScheme, second: &mut CouplingScheme) {
    first.first_synchronization(&[]).unwrap();
    first.first_exchange().unwrap();
    second.first_synchronization(&[]).unwrap();
    second.first_exchange().unwrap();
    second.second_synchronization().unwrap();
    second.second_exchange().unwrap();
    first.second_synchronization().unwrap();
    first.second_exchange().unwrap();
}

fn fulfill_if_required(scheme: &mut CouplingScheme, action: Action) -> bool {
    if scheme.is_action_required(action) {
        scheme.mark_action_fulfilled(action).unwrap();
        return true;
    }
    false
}

fn explicit_parallel_pair(
    max_time: f64,
    window_size: f64,
) -> (CouplingScheme, CouplingScheme, SharedDatum, SharedDatum) {
    let (channel_a, channel_b) = InMemoryChannel::pair();
    let mut a = CouplingScheme::parallel(
        SchemeConfig::explicit("fluid")
            .with_max_time(max_time)
            .with_time_window_size(window_size)
            .as_first_participant(),
        "solid",
        Box::new(channel_a),
    )
    .unwrap();
    let mut b = CouplingScheme::parallel(
        SchemeConfig::explicit("solid")
            .with_max_time(max_time)
            .with_time_window_size(window_size),
        "fluid",
        Box::new(channel_b),
    )
    .unwrap();

    let send_a = a.add_send_data(scalar(1, "Forces")).unwrap();
    a.add_receive_data(scalar(2, "Displacements")).unwrap();
    b.add_receive_data(scalar(1, "Forces")).unwrap();
    let send_b = b.add_send_data(scalar(2, "Displacements")).unwrap();

    (a, b, send_a, send_b)
}

// ── Scenario 1: explicit coupling with fitting windows ───────────────

#[test]
fn explicit_fitting_windows() {
    let (mut a, mut b, send_a, send_b) = explicit_parallel_pair(1.0, 0.25);
    a.initialize(0.0, 1).unwrap();
    b.initialize(0.0, 1).unwrap();

    let mut windows = 0;
    while a.is_coupling_ongoing() {
        let dt = a.next_time_step_max_size();
        assert!(tandem_types::math::equals(dt, 0.25));
        assert!(tandem_types::math::equals(b.next_time_step_max_size(), 0.25));

        let end = a.time() + dt;
        send_a.borrow_mut().write_values_at_time(end, &[end]);
        send_b.borrow_mut().write_values_at_time(end, &[-end]);
        assert!(a.add_computed_time(dt).unwrap());
        assert!(b.add_computed_time(dt).unwrap());

        advance_pair(&mut a, &mut b);
        assert!(a.is_time_window_complete());
        assert!(tandem_types::math::equals(a.time(), a.window_start_time()));
        windows += 1;
    }

    assert_eq!(windows, 4);
    assert_eq!(a.time_windows(), 5);
    assert!(tandem_types::math::equals(a.time(), 1.0));
    assert!(tandem_types::math::equals(b.time(), 1.0));
    a.finalize().unwrap();
    b.finalize().unwrap();
}

// ── Scenario 2: explicit coupling with a non-fitting final window ────

#[test]
fn explicit_nonfitting_final_window() {
    let (mut a, mut b, send_a, send_b) = explicit_parallel_pair(1.0, 0.75);
    a.initialize(0.0, 1).unwrap();
    b.initialize(0.0, 1).unwrap();

    let expected_sizes = [0.75, 0.25];
    let mut windows = 0;
    while a.is_coupling_ongoing() {
        let dt = a.next_time_step_max_size();
        assert!(
            tandem_types::math::equals(dt, expected_sizes[windows]),
            "window {windows}: expected {} but may step {dt}",
            expected_sizes[windows]
        );

        let end = a.time() + dt;
        send_a.borrow_mut().write_values_at_time(end, &[end]);
        send_b.borrow_mut().write_values_at_time(end, &[-end]);
        a.add_computed_time(dt).unwrap();
        b.add_computed_time(dt).unwrap();
        advance_pair(&mut a, &mut b);
        windows += 1;
    }

    assert_eq!(windows, 2);
    // The truncated final window ends exactly at max-time.
    assert!(tandem_types::math::equals(a.time(), 1.0));
}

// ── Scenarios 3 and 4: implicit iteration control ────────────────────

fn implicit_parallel_pair(
    log_dir: &std::path::Path,
    max_iterations: i32,
) -> (CouplingScheme, CouplingScheme, SharedDatum, SharedDatum) {
    let (channel_a, channel_b) = InMemoryChannel::pair();
    let mut a = CouplingScheme::parallel(
        SchemeConfig::implicit("fluid", 1, max_iterations)
            .with_max_time(0.25)
            .with_time_window_size(0.25)
            .as_first_participant()
            .with_log_directory(log_dir),
        "solid",
        Box::new(channel_a),
    )
    .unwrap();
    let mut b = CouplingScheme::parallel(
        SchemeConfig::implicit("solid", 1, max_iterations)
            .with_max_time(0.25)
            .with_time_window_size(0.25)
            .with_log_directory(log_dir),
        "fluid",
        Box::new(channel_b),
    )
    .unwrap();

    let send_a = a.add_send_data(scalar(1, "Forces")).unwrap();
    a.add_receive_data(scalar(2, "Displacements")).unwrap();
    b.add_receive_data(scalar(1, "Forces")).unwrap();
    let send_b = b.add_send_data(scalar(2, "Displacements")).unwrap();

    (a, b, send_a, send_b)
}

#[test]
fn implicit_converges_within_iteration_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (mut a, mut b, send_a, send_b) = implicit_parallel_pair(dir.path(), 5);

    let acceleration_log = Rc::new(RefCell::new(AccelerationLog::default()));
    b.set_acceleration(Box::new(RecordingAcceleration {
        log: Rc::clone(&acceleration_log),
    }));
    b.add_convergence_measure(DataId::new(1), false, false, ConvergeAfter::new(3), true)
        .unwrap();

    a.initialize(0.0, 1).unwrap();
    b.initialize(0.0, 1).unwrap();
    assert!(a.is_action_required(Action::WriteCheckpoint));
    assert!(b.is_action_required(Action::WriteCheckpoint));

    let mut iterations_seen = Vec::new();
    while a.is_coupling_ongoing() {
        fulfill_if_required(&mut a, Action::WriteCheckpoint);
        fulfill_if_required(&mut b, Action::WriteCheckpoint);
        iterations_seen.push(b.iterations());

        send_a.borrow_mut().write_values_at_time(0.25, &[1.0]);
        send_b.borrow_mut().write_values_at_time(0.25, &[2.0]);
        a.add_computed_time(0.25).unwrap();
        b.add_computed_time(0.25).unwrap();
        advance_pair(&mut a, &mut b);

        let rolled_back = fulfill_if_required(&mut b, Action::ReadCheckpoint);
        assert_eq!(rolled_back, fulfill_if_required(&mut a, Action::ReadCheckpoint));
        if rolled_back {
            assert!(!b.is_time_window_complete());
            assert!(!b.has_converged());
        }
    }

    assert_eq!(iterations_seen, vec![1, 2, 3]);
    assert_eq!(b.iterations(), 1);
    assert!(b.has_converged());
    assert!(b.is_time_window_complete());
    // No further window follows, so no new checkpoint is requested.
    assert!(!b.is_action_required(Action::WriteCheckpoint));

    let log = acceleration_log.borrow();
    assert_eq!(log.initialized, 1);
    assert_eq!(log.accelerated, 2);
    assert_eq!(log.converged, 1);
    drop(log);

    a.finalize().unwrap();
    b.finalize().unwrap();

    let iterations_table =
        std::fs::read_to_string(dir.path().join("tandem-solid-iterations.log")).unwrap();
    let lines: Vec<&str> = iterations_table.lines().collect();
    assert!(lines[0].starts_with("TimeWindow  TotalIterations  Iterations  Convergence"));
    assert!(lines[1].starts_with("1  3  3  1"));

    let convergence_table =
        std::fs::read_to_string(dir.path().join("tandem-solid-convergence.log")).unwrap();
    let lines: Vec<&str> = convergence_table.lines().collect();
    assert_eq!(lines[0], "TimeWindow  Iteration  ResAbs(Forces)");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("1  1"));
    assert!(lines[3].starts_with("1  3"));
}

#[test]
fn implicit_forces_acceptance_at_iteration_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (mut a, mut b, send_a, send_b) = implicit_parallel_pair(dir.path(), 5);
    b.add_convergence_measure(DataId::new(1), false, false, ConvergeAfter::never(), false)
        .unwrap();

    a.initialize(0.0, 1).unwrap();
    b.initialize(0.0, 1).unwrap();

    let mut iterations_seen = Vec::new();
    while a.is_coupling_ongoing() {
        fulfill_if_required(&mut a, Action::WriteCheckpoint);
        fulfill_if_required(&mut b, Action::WriteCheckpoint);
        iterations_seen.push(b.iterations());

        send_a.borrow_mut().write_values_at_time(0.25, &[1.0]);
        send_b.borrow_mut().write_values_at_time(0.25, &[2.0]);
        a.add_computed_time(0.25).unwrap();
        b.add_computed_time(0.25).unwrap();
        advance_pair(&mut a, &mut b);

        fulfill_if_required(&mut a, Action::ReadCheckpoint);
        fulfill_if_required(&mut b, Action::ReadCheckpoint);
    }

    // The measure never converges; the limit forces acceptance without an
    // error.
    assert_eq!(iterations_seen, vec![1, 2, 3, 4, 5]);
    assert!(b.has_converged());
    assert!(b.is_time_window_complete());
}

// ── Scenario 5: strict measure aborts at the iteration limit ─────────

#[test]
fn strict_measure_aborts_at_iteration_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (mut a, mut b, send_a, send_b) = implicit_parallel_pair(dir.path(), 3);
    b.add_convergence_measure(DataId::new(1), false, true, ConvergeAfter::never(), false)
        .unwrap();

    a.initialize(0.0, 1).unwrap();
    b.initialize(0.0, 1).unwrap();

    for iteration in 1..=3 {
        fulfill_if_required(&mut a, Action::WriteCheckpoint);
        fulfill_if_required(&mut b, Action::WriteCheckpoint);

        send_a.borrow_mut().write_values_at_time(0.25, &[1.0]);
        send_b.borrow_mut().write_values_at_time(0.25, &[2.0]);
        a.add_computed_time(0.25).unwrap();
        b.add_computed_time(0.25).unwrap();

        a.first_synchronization(&[]).unwrap();
        a.first_exchange().unwrap();
        b.first_synchronization(&[]).unwrap();
        b.first_exchange().unwrap();
        b.second_synchronization().unwrap();

        if iteration < 3 {
            b.second_exchange().unwrap();
            a.second_synchronization().unwrap();
            a.second_exchange().unwrap();
            fulfill_if_required(&mut a, Action::ReadCheckpoint);
            fulfill_if_required(&mut b, Action::ReadCheckpoint);
        } else {
            let err = b.second_exchange().unwrap_err();
            match err {
                SchemeError::StrictConvergenceFailure { data, iterations } => {
                    assert_eq!(data, "Forces");
                    assert_eq!(iterations, 3);
                }
                other => panic!("expected a strict convergence failure, got {other}"),
            }
        }
    }
}

// ── Scenario 6: substep exchange round trip ──────────────────────────

#[test]
fn substep_exchange_round_trip() {
    let (channel_a, channel_b) = InMemoryChannel::pair();
    let mut a = CouplingScheme::parallel(
        SchemeConfig::explicit("fluid")
            .with_max_time(0.4)
            .with_time_window_size(0.4)
            .as_first_participant(),
        "solid",
        Box::new(channel_a),
    )
    .unwrap();
    let mut b = CouplingScheme::parallel(
        SchemeConfig::explicit("solid")
            .with_max_time(0.4)
            .with_time_window_size(0.4),
        "fluid",
        Box::new(channel_b),
    )
    .unwrap();

    let send_a = a
        .add_send_data(scalar(1, "Forces").exchanging_substeps())
        .unwrap();
    let received = b
        .add_receive_data(scalar(1, "Forces").exchanging_substeps())
        .unwrap();
    a.add_receive_data(scalar(2, "Displacements")).unwrap();
    let send_b = b.add_send_data(scalar(2, "Displacements")).unwrap();

    a.initialize(0.0, 1).unwrap();
    b.initialize(0.0, 1).unwrap();
    assert!(a.requires_substeps());

    // Four solver substeps inside one window of size 0.4.
    for (time, value) in [(0.1, 1.0), (0.2, 2.0), (0.3, 3.0), (0.4, 4.0)] {
        send_a.borrow_mut().write_values_at_time(time, &[value]);
        a.add_computed_time(0.1).unwrap();
    }
    send_b.borrow_mut().write_values_at_time(0.4, &[0.0]);
    b.add_computed_time(0.4).unwrap();

    a.first_synchronization(&[]).unwrap();
    a.first_exchange().unwrap();
    b.first_synchronization(&[]).unwrap();
    b.first_exchange().unwrap();

    {
        let received = received.borrow();
        let times = received.times();
        assert_eq!(times.len(), 5, "initial stample plus four substeps");
        for (expected, actual) in [0.0, 0.1, 0.2, 0.3, 0.4].iter().zip(&times) {
            assert!(tandem_types::math::equals(*expected, *actual));
        }
        let values: Vec<f64> = received
            .stamples()
            .iter()
            .map(|s| s.sample.values[0])
            .collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    b.second_synchronization().unwrap();
    b.second_exchange().unwrap();
    a.second_synchronization().unwrap();
    a.second_exchange().unwrap();
    assert!(a.is_time_window_complete());
    assert!(b.is_time_window_complete());
}

// ── Scenario 7: missing required action ──────────────────────────────

#[test]
fn missing_checkpoint_fails_the_next_exchange() {
    let (channel_a, _peer) = InMemoryChannel::pair();
    let mut a = CouplingScheme::parallel(
        SchemeConfig::implicit("fluid", 1, 5)
            .with_max_time(1.0)
            .with_time_window_size(0.25)
            .as_first_participant()
            .on_secondary_rank(),
        "solid",
        Box::new(channel_a),
    )
    .unwrap();
    a.add_send_data(scalar(1, "Forces")).unwrap();

    a.initialize(0.0, 1).unwrap();
    assert!(a.is_action_required(Action::WriteCheckpoint));

    a.add_computed_time(0.25).unwrap();
    let err = a.first_exchange().unwrap_err();
    match err {
        SchemeError::UnfulfilledActions { missing } => {
            assert!(missing.contains("write-checkpoint"));
        }
        other => panic!("expected unfulfilled actions, got {other}"),
    }
}

// ── Scenario 8: the first participant dictates the window size ───────

#[test]
fn dynamic_window_size_is_announced_by_the_first_participant() {
    let (channel_a, mut peer) = InMemoryChannel::pair();
    let mut a = CouplingScheme::serial(
        SchemeConfig::explicit("fluid")
            .with_max_time(1.0)
            .with_first_participant_sizing()
            .as_first_participant(),
        "solid",
        Box::new(channel_a),
    )
    .unwrap();
    let send_a = a.add_send_data(scalar(1, "Forces")).unwrap();
    a.add_receive_data(scalar(2, "Displacements")).unwrap();

    a.initialize(0.0, 1).unwrap();
    // No configured window size: every step ends a window.
    assert!(!a.has_time_window_size());

    send_a.borrow_mut().write_values_at_time(0.3, &[1.5]);
    assert!(a.add_computed_time(0.3).unwrap());
    a.first_synchronization(&[]).unwrap();
    a.first_exchange().unwrap();

    // The announced size precedes the data on the wire.
    assert!(tandem_types::math::equals(peer.receive_double().unwrap(), 0.3));
    assert_eq!(peer.receive_doubles(1).unwrap(), vec![1.5]);

    peer.send_doubles(&[9.0]).unwrap();
    a.second_synchronization().unwrap();
    a.second_exchange().unwrap();
    assert!(a.is_time_window_complete());
    assert!(tandem_types::math::equals(a.window_start_time(), 0.3));
}

#[test]
fn second_participant_adopts_the_dictated_window_size() {
    let (channel_b, mut peer) = InMemoryChannel::pair();
    let mut b = CouplingScheme::serial(
        SchemeConfig::explicit("solid")
            .with_max_time(1.0)
            .with_first_participant_sizing(),
        "fluid",
        Box::new(channel_b),
    )
    .unwrap();
    let send_b = b.add_send_data(scalar(2, "Displacements")).unwrap();
    let received = b.add_receive_data(scalar(1, "Forces")).unwrap();

    b.initialize(0.0, 1).unwrap();

    // The first participant already advanced its first window of 0.3.
    peer.send_double(0.3).unwrap();
    peer.send_doubles(&[1.5]).unwrap();
    b.receive_result_of_first_advance().unwrap();

    assert!(b.has_time_window_size());
    assert!(tandem_types::math::equals(b.time_window_size(), 0.3));
    assert!(tandem_types::math::equals(b.next_time_step_max_size(), 0.3));
    // The received window-end data sits at the end of the first window.
    assert!(tandem_types::math::equals(received.borrow().last_stample().time, 0.3));

    send_b.borrow_mut().write_values_at_time(0.3, &[2.5]);
    assert!(b.add_computed_time(0.3).unwrap());
    b.first_synchronization(&[]).unwrap();
    b.first_exchange().unwrap();

    // The peer's next window (size 0.5) is already on the wire.
    peer.send_double(0.5).unwrap();
    peer.send_doubles(&[1.6]).unwrap();
    b.second_synchronization().unwrap();
    b.second_exchange().unwrap();

    assert_eq!(peer.receive_doubles(1).unwrap(), vec![2.5]);
    assert!(b.is_time_window_complete());
    // The dictated size was adopted for the next window.
    assert!(tandem_types::math::equals(b.time_window_size(), 0.5));
    assert!(tandem_types::math::equals(b.next_time_step_max_size(), 0.5));
    assert!(tandem_types::math::equals(received.borrow().last_stample().time, 0.8));
}

// ── Serial schedule, fixed window sizes ──────────────────────────────

#[test]
fn serial_first_participant_round_trip() {
    let (channel_a, mut peer) = InMemoryChannel::pair();
    let mut a = CouplingScheme::serial(
        SchemeConfig::explicit("fluid")
            .with_max_time(0.5)
            .with_time_window_size(0.25)
            .as_first_participant(),
        "solid",
        Box::new(channel_a),
    )
    .unwrap();
    let send_a = a.add_send_data(scalar(1, "Forces")).unwrap();
    let received = a.add_receive_data(scalar(2, "Displacements")).unwrap();

    a.initialize(0.0, 1).unwrap();

    let mut windows = 0;
    for window_end in [0.25, 0.5] {
        send_a.borrow_mut().write_values_at_time(window_end, &[window_end]);
        assert!(a.add_computed_time(0.25).unwrap());
        a.first_synchronization(&[]).unwrap();
        a.first_exchange().unwrap();
        assert_eq!(peer.receive_doubles(1).unwrap(), vec![window_end]);

        peer.send_doubles(&[10.0 + window_end]).unwrap();
        a.second_synchronization().unwrap();
        a.second_exchange().unwrap();
        assert!(a.is_time_window_complete());
        windows += 1;
    }

    assert_eq!(windows, 2);
    assert!(!a.is_coupling_ongoing());
    // The peer's results are stamped for use in the following window.
    assert!(tandem_types::math::equals(received.borrow().last_stample().time, 0.75));
    a.finalize().unwrap();
}

#[test]
fn serial_second_participant_decides_convergence() {
    let dir = tempfile::tempdir().unwrap();
    let (channel_b, mut peer) = InMemoryChannel::pair();
    let mut b = CouplingScheme::serial(
        SchemeConfig::implicit("solid", 1, 5)
            .with_max_time(1.0)
            .with_time_window_size(0.5)
            .with_log_directory(dir.path()),
        "fluid",
        Box::new(channel_b),
    )
    .unwrap();
    let send_b = b.add_send_data(scalar(2, "Displacements")).unwrap();
    let received = b.add_receive_data(scalar(1, "Forces")).unwrap();
    b.add_convergence_measure(DataId::new(1), false, false, ConvergeAfter::new(2), false)
        .unwrap();

    b.initialize(0.0, 1).unwrap();
    peer.send_doubles(&[10.0]).unwrap();
    b.receive_result_of_first_advance().unwrap();
    assert!(tandem_types::math::equals(received.borrow().last_stample().time, 0.5));

    // Iteration 1: does not converge, the window is rolled back.
    fulfill_if_required(&mut b, Action::WriteCheckpoint);
    send_b.borrow_mut().write_values_at_time(0.5, &[2.0]);
    assert!(b.add_computed_time(0.5).unwrap());
    b.first_synchronization(&[]).unwrap();
    b.first_exchange().unwrap();
    peer.send_doubles(&[11.0]).unwrap(); // the peer's repeated window
    b.second_synchronization().unwrap();
    b.second_exchange().unwrap();

    assert!(!peer.receive_bool().unwrap(), "convergence flag precedes the data");
    assert_eq!(peer.receive_doubles(1).unwrap(), vec![2.0]);
    assert!(!b.is_time_window_complete());
    assert!(b.is_action_required(Action::ReadCheckpoint));
    fulfill_if_required(&mut b, Action::ReadCheckpoint);
    assert_eq!(b.iterations(), 2);
    assert!(tandem_types::math::equals(b.time(), 0.0));

    // Iteration 2: converges, the window completes.
    send_b.borrow_mut().write_values_at_time(0.5, &[2.5]);
    assert!(b.add_computed_time(0.5).unwrap());
    b.first_synchronization(&[]).unwrap();
    b.first_exchange().unwrap();
    peer.send_doubles(&[12.0]).unwrap(); // the peer's next window
    b.second_synchronization().unwrap();
    b.second_exchange().unwrap();

    assert!(peer.receive_bool().unwrap());
    assert_eq!(peer.receive_doubles(1).unwrap(), vec![2.5]);
    assert!(b.is_time_window_complete());
    assert_eq!(b.iterations(), 1);
    assert!(b.is_action_required(Action::WriteCheckpoint));
    assert!(tandem_types::math::equals(b.window_start_time(), 0.5));
    // The next window's incoming data sits at its end.
    assert!(tandem_types::math::equals(received.borrow().last_stample().time, 1.0));
}

// ── Multi schedule: a controller coupled to two peers ────────────────

#[test]
fn multi_controller_decides_for_all_peers() {
    let dir = tempfile::tempdir().unwrap();
    let (c_to_p1, p1_channel) = InMemoryChannel::pair();
    let (c_to_p2, p2_channel) = InMemoryChannel::pair();

    let implicit = |name: &str| {
        SchemeConfig::implicit(name, 1, 5)
            .with_max_time(0.25)
            .with_time_window_size(0.25)
            .with_log_directory(dir.path())
    };

    let mut controller = CouplingScheme::multi(
        implicit("controller"),
        vec![
            PeerLink::new("p1", Box::new(c_to_p1)),
            PeerLink::new("p2", Box::new(c_to_p2)),
        ],
    )
    .unwrap();
    let mut p1 = CouplingScheme::multi(
        implicit("p1").as_first_participant(),
        vec![PeerLink::new("controller", Box::new(p1_channel))],
    )
    .unwrap();
    let mut p2 = CouplingScheme::multi(
        implicit("p2").as_first_participant(),
        vec![PeerLink::new("controller", Box::new(p2_channel))],
    )
    .unwrap();

    controller.add_receive_data_for("p1", scalar(1, "FluxOne")).unwrap();
    controller.add_receive_data_for("p2", scalar(2, "FluxTwo")).unwrap();
    let c_send_1 = controller.add_send_data_for("p1", scalar(3, "StateOne")).unwrap();
    let c_send_2 = controller.add_send_data_for("p2", scalar(4, "StateTwo")).unwrap();
    let p1_send = p1.add_send_data_for("controller", scalar(1, "FluxOne")).unwrap();
    p1.add_receive_data_for("controller", scalar(3, "StateOne")).unwrap();
    let p2_send = p2.add_send_data_for("controller", scalar(2, "FluxTwo")).unwrap();
    p2.add_receive_data_for("controller", scalar(4, "StateTwo")).unwrap();

    controller
        .add_convergence_measure(DataId::new(1), false, false, ConvergeAfter::new(2), false)
        .unwrap();

    controller.initialize(0.0, 1).unwrap();
    p1.initialize(0.0, 1).unwrap();
    p2.initialize(0.0, 1).unwrap();

    let mut iterations = 0;
    while controller.is_coupling_ongoing() {
        for scheme in [&mut controller, &mut p1, &mut p2] {
            fulfill_if_required(scheme, Action::WriteCheckpoint);
        }
        iterations += 1;

        p1_send.borrow_mut().write_values_at_time(0.25, &[1.0]);
        p2_send.borrow_mut().write_values_at_time(0.25, &[2.0]);
        c_send_1.borrow_mut().write_values_at_time(0.25, &[3.0]);
        c_send_2.borrow_mut().write_values_at_time(0.25, &[4.0]);
        for scheme in [&mut p1, &mut p2, &mut controller] {
            scheme.add_computed_time(0.25).unwrap();
        }

        // Blocking-transport order: peers send, the controller turns
        // everything around, the peers receive.
        for scheme in [&mut p1, &mut p2, &mut controller] {
            scheme.first_synchronization(&[]).unwrap();
            scheme.first_exchange().unwrap();
        }
        for scheme in [&mut controller, &mut p1, &mut p2] {
            scheme.second_synchronization().unwrap();
            scheme.second_exchange().unwrap();
        }

        for scheme in [&mut controller, &mut p1, &mut p2] {
            fulfill_if_required(scheme, Action::ReadCheckpoint);
        }
    }

    assert_eq!(iterations, 2);
    for scheme in [&controller, &p1, &p2] {
        assert!(scheme.has_converged());
        assert!(scheme.is_time_window_complete());
        assert!(!scheme.is_coupling_ongoing());
    }
}

// ── Initial data handshake ───────────────────────────────────────────

#[test]
fn initial_data_reaches_the_receiver_before_the_first_window() {
    let (channel_a, channel_b) = InMemoryChannel::pair();
    let mut a = CouplingScheme::parallel(
        SchemeConfig::explicit("fluid")
            .with_max_time(1.0)
            .with_time_window_size(0.5)
            .as_first_participant(),
        "solid",
        Box::new(channel_a),
    )
    .unwrap();
    let mut b = CouplingScheme::parallel(
        SchemeConfig::explicit("solid")
            .with_max_time(1.0)
            .with_time_window_size(0.5),
        "fluid",
        Box::new(channel_b),
    )
    .unwrap();

    a.add_send_data(scalar(1, "Forces")).unwrap();
    let a_received = a
        .add_receive_data(scalar(2, "Displacements").requiring_initialization())
        .unwrap();
    b.add_receive_data(scalar(1, "Forces")).unwrap();
    let b_send = b
        .add_send_data(scalar(2, "Displacements").requiring_initialization())
        .unwrap();

    assert!(b.is_action_required(Action::InitializeData));
    assert!(b.sends_initialized_data());
    assert!(a.receives_initialized_data());
    // The receive side expects data but requests no action of its own.
    assert!(!a.is_action_required(Action::InitializeData));

    b_send.borrow_mut().set_values(&[7.0]);
    b.mark_action_fulfilled(Action::InitializeData).unwrap();

    b.initialize(0.0, 1).unwrap();
    a.initialize(0.0, 1).unwrap();

    assert!(a.has_data_been_received());
    assert_eq!(a_received.borrow().values().as_slice(), &[7.0]);
    assert!(tandem_types::math::equals(a_received.borrow().last_stample().time, 0.0));
}
