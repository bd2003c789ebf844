//! Per-exchange data handles and time-stamped sample storage.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::DVector;
use tandem_types::{math, DataId, Direction, MeshId, Sample};

/// A sample together with the time it was taken at.
#[derive(Clone, Debug, PartialEq)]
pub struct Stample {
    pub time: f64,
    pub sample: Sample,
}

/// Static description of an exchanged data field.
#[derive(Clone, Debug)]
pub struct DataSpec {
    pub id: DataId,
    pub name: String,
    pub mesh_id: MeshId,
    /// Components per mesh node (1 for scalar fields).
    pub dimensions: usize,
    /// Spatial dimensionality of the mesh; sizes the gradient buffer.
    pub mesh_dimensions: usize,
    /// Nodes of the coupling interface held by this rank.
    pub vertex_count: usize,
    pub requires_initialization: bool,
    pub exchange_substeps: bool,
    pub with_gradient: bool,
}

impl DataSpec {
    /// A scalar field on `vertex_count` nodes of a 3D mesh.
    pub fn scalar(id: DataId, name: impl Into<String>, mesh_id: MeshId, vertex_count: usize) -> Self {
        Self {
            id,
            name: name.into(),
            mesh_id,
            dimensions: 1,
            mesh_dimensions: 3,
            vertex_count,
            requires_initialization: false,
            exchange_substeps: false,
            with_gradient: false,
        }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_mesh_dimensions(mut self, mesh_dimensions: usize) -> Self {
        self.mesh_dimensions = mesh_dimensions;
        self
    }

    pub fn requiring_initialization(mut self) -> Self {
        self.requires_initialization = true;
        self
    }

    pub fn exchanging_substeps(mut self) -> Self {
        self.exchange_substeps = true;
        self
    }

    pub fn with_gradient(mut self) -> Self {
        self.with_gradient = true;
        self
    }
}

/// Shared handle to a [`CouplingDatum`].
///
/// The scheme, the convergence measures and the acceleration module all hold
/// the same handle; the scheme is the only mutator during an exchange.
pub type SharedDatum = Rc<RefCell<CouplingDatum>>;

/// One exchanged data field: its working sample, the snapshot of the
/// previous iteration, and the time-stamped storage covering the current
/// window.
#[derive(Debug)]
pub struct CouplingDatum {
    spec: DataSpec,
    direction: Direction,
    sample: Sample,
    previous_iteration: DVector<f64>,
    storage: Vec<Stample>,
}

impl CouplingDatum {
    pub fn new(spec: DataSpec, direction: Direction) -> Self {
        let len = spec.dimensions * spec.vertex_count;
        let sample = if spec.with_gradient {
            Sample::zeros_with_gradients(len, spec.dimensions * spec.mesh_dimensions * spec.vertex_count)
        } else {
            Sample::zeros(len)
        };
        Self {
            previous_iteration: DVector::zeros(len),
            spec,
            direction,
            sample,
            storage: Vec::new(),
        }
    }

    /// Convenience constructor returning a shared handle.
    pub fn shared(spec: DataSpec, direction: Direction) -> SharedDatum {
        Rc::new(RefCell::new(Self::new(spec, direction)))
    }

    pub fn id(&self) -> DataId {
        self.spec.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn mesh_id(&self) -> MeshId {
        self.spec.mesh_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn dimensions(&self) -> usize {
        self.spec.dimensions
    }

    pub fn mesh_dimensions(&self) -> usize {
        self.spec.mesh_dimensions
    }

    pub fn requires_initialization(&self) -> bool {
        self.spec.requires_initialization
    }

    pub fn exchange_substeps(&self) -> bool {
        self.spec.exchange_substeps
    }

    pub fn has_gradient(&self) -> bool {
        self.spec.with_gradient
    }

    /// Entries of one serialized sample on the wire.
    pub fn values_per_sample(&self) -> usize {
        self.spec.dimensions * self.spec.vertex_count
    }

    /// Entries of one serialized gradient on the wire.
    pub fn gradients_per_sample(&self) -> usize {
        self.spec.dimensions * self.spec.mesh_dimensions * self.spec.vertex_count
    }

    // ── Working sample ───────────────────────────────────────────────

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.sample.values
    }

    pub fn gradients(&self) -> Option<&DVector<f64>> {
        self.sample.gradients.as_ref()
    }

    pub fn set_values(&mut self, values: &[f64]) {
        assert_eq!(values.len(), self.values_per_sample(), "value buffer size changed");
        self.sample.values = DVector::from_column_slice(values);
    }

    pub fn set_gradients(&mut self, gradients: &[f64]) {
        assert!(self.has_gradient(), "data carries no gradients");
        assert_eq!(gradients.len(), self.gradients_per_sample(), "gradient buffer size changed");
        self.sample.gradients = Some(DVector::from_column_slice(gradients));
    }

    /// Copies the latest stample into the working sample.
    pub fn adopt_last_stample(&mut self) {
        self.sample = self.last_stample().sample.clone();
    }

    // ── Iteration snapshot ───────────────────────────────────────────

    /// Values at the start of the current implicit iteration.
    pub fn previous_iteration(&self) -> &DVector<f64> {
        &self.previous_iteration
    }

    /// Snapshots the working values as the new iteration baseline.
    pub fn store_iteration(&mut self) {
        self.previous_iteration = self.sample.values.clone();
    }

    // ── Time-stamped storage ─────────────────────────────────────────

    pub fn stamples(&self) -> &[Stample] {
        &self.storage
    }

    /// Ascending times of all stored stamples.
    pub fn times(&self) -> Vec<f64> {
        self.storage.iter().map(|s| s.time).collect()
    }

    /// Samples of all stored stamples, in time order.
    pub fn sample_run(&self) -> Vec<Sample> {
        self.storage.iter().map(|s| s.sample.clone()).collect()
    }

    pub fn last_stample(&self) -> &Stample {
        self.storage.last().expect("stample storage is empty")
    }

    /// Appends a stample, or replaces the latest one when `time` matches it
    /// within tolerance. Storing earlier than the latest stored time is a
    /// programming error.
    pub fn set_sample_at_time(&mut self, time: f64, sample: Sample) {
        assert_eq!(sample.len(), self.values_per_sample(), "sample shape changed");
        if let Some(last) = self.storage.last_mut() {
            if math::equals(time, last.time) {
                last.sample = sample;
                return;
            }
            assert!(
                math::greater(time, last.time),
                "stample at t={} would break the time ordering (latest is t={})",
                time,
                last.time
            );
        }
        self.storage.push(Stample { time, sample });
    }

    /// Updates the working values and stores them at `time` in one go.
    pub fn write_values_at_time(&mut self, time: f64, values: &[f64]) {
        self.set_values(values);
        self.set_sample_at_time(time, self.sample.clone());
    }

    /// Drops all stamples strictly after `time` (tolerant comparison), so a
    /// repeated window can be rewritten from its start.
    pub fn retreat_to(&mut self, time: f64) {
        self.storage.retain(|s| !math::greater(s.time, time));
    }

    /// Keeps only the latest stample as the initial stample of the next
    /// window.
    pub fn move_to_next_window(&mut self) {
        let last = self.storage.pop().expect("stample storage is empty");
        self.storage.clear();
        self.storage.push(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_datum(direction: Direction) -> CouplingDatum {
        CouplingDatum::new(
            DataSpec::scalar(DataId::new(1), "Forces", MeshId::new(1), 2),
            direction,
        )
    }

    fn sample2(a: f64, b: f64) -> Sample {
        Sample::from_values(vec![a, b])
    }

    #[test]
    fn storage_stays_time_ordered() {
        let mut datum = scalar_datum(Direction::Send);
        datum.set_sample_at_time(0.0, sample2(0.0, 0.0));
        datum.set_sample_at_time(0.1, sample2(1.0, 1.0));
        datum.set_sample_at_time(0.2, sample2(2.0, 2.0));
        assert_eq!(datum.times(), vec![0.0, 0.1, 0.2]);
    }

    #[test]
    fn equal_time_replaces_latest_stample() {
        let mut datum = scalar_datum(Direction::Receive);
        datum.set_sample_at_time(0.0, sample2(0.0, 0.0));
        datum.set_sample_at_time(0.25, sample2(1.0, 1.0));
        datum.set_sample_at_time(0.25 + 1e-14, sample2(2.0, 2.0));

        assert_eq!(datum.stamples().len(), 2);
        assert_eq!(datum.last_stample().sample, sample2(2.0, 2.0));
    }

    #[test]
    #[should_panic(expected = "time ordering")]
    fn storing_into_the_past_panics() {
        let mut datum = scalar_datum(Direction::Send);
        datum.set_sample_at_time(0.2, sample2(1.0, 1.0));
        datum.set_sample_at_time(0.1, sample2(2.0, 2.0));
    }

    #[test]
    fn move_to_next_window_keeps_only_the_latest() {
        let mut datum = scalar_datum(Direction::Send);
        for (i, t) in [0.0, 0.1, 0.2, 0.3].iter().enumerate() {
            datum.set_sample_at_time(*t, sample2(i as f64, 0.0));
        }
        datum.move_to_next_window();

        assert_eq!(datum.times(), vec![0.3]);
        assert_eq!(datum.last_stample().sample, sample2(3.0, 0.0));
    }

    #[test]
    fn retreat_drops_later_stamples_only() {
        let mut datum = scalar_datum(Direction::Send);
        for t in [0.0, 0.1, 0.2, 0.3] {
            datum.set_sample_at_time(t, sample2(t, 0.0));
        }
        datum.retreat_to(0.1);
        assert_eq!(datum.times(), vec![0.0, 0.1]);
    }

    #[test]
    fn store_iteration_snapshots_working_values() {
        let mut datum = scalar_datum(Direction::Receive);
        datum.set_values(&[4.0, 5.0]);
        datum.store_iteration();
        datum.set_values(&[6.0, 7.0]);

        assert_eq!(datum.previous_iteration().as_slice(), &[4.0, 5.0]);
        assert_eq!(datum.values().as_slice(), &[6.0, 7.0]);
    }

    #[test]
    fn gradient_buffers_are_sized_by_mesh_dimensionality() {
        let spec = DataSpec::scalar(DataId::new(2), "Displacements", MeshId::new(1), 2)
            .with_dimensions(3)
            .with_gradient();
        let datum = CouplingDatum::new(spec, Direction::Send);

        assert_eq!(datum.values_per_sample(), 6);
        assert_eq!(datum.gradients_per_sample(), 18);
        assert!(datum.gradients().is_some());
    }
}
