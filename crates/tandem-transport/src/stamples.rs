//! Packing time-ordered samples into flat wire vectors.

use nalgebra::DVector;
use tandem_types::Sample;

/// A run of time-stamped samples serialized for transport.
///
/// Layout is time-major: sample `t` occupies `values[t*unit .. (t+1)*unit]`
/// where `unit` is the per-sample value count, and within one sample the
/// order is node-major then component. Gradients follow the same scheme
/// with their own per-sample unit.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedStamples {
    n_time_steps: usize,
    values: Vec<f64>,
    gradients: Option<Vec<f64>>,
}

impl SerializedStamples {
    /// Packs samples in their given (ascending time) order.
    ///
    /// All samples must share one shape; gradients are packed iff the first
    /// sample carries them.
    pub fn pack(samples: &[Sample]) -> Self {
        assert!(!samples.is_empty(), "cannot pack an empty sample run");
        let unit = samples[0].len();
        let with_gradients = samples[0].has_gradients();

        let mut values = Vec::with_capacity(samples.len() * unit);
        let mut gradients = with_gradients.then(Vec::new);
        for sample in samples {
            assert_eq!(sample.len(), unit, "sample shape changed mid-run");
            values.extend_from_slice(sample.values.as_slice());
            if let Some(out) = gradients.as_mut() {
                let g = sample
                    .gradients
                    .as_ref()
                    .expect("sample shape changed mid-run");
                out.extend_from_slice(g.as_slice());
            }
        }

        Self {
            n_time_steps: samples.len(),
            values,
            gradients,
        }
    }

    /// Rebuilds the sample run from flat wire vectors.
    ///
    /// `values.len()` must be a multiple of `n_time_steps`; when gradients
    /// are present their length must likewise split evenly.
    pub fn unpack(
        n_time_steps: usize,
        values: Vec<f64>,
        gradients: Option<Vec<f64>>,
    ) -> Vec<Sample> {
        assert!(n_time_steps > 0, "cannot unpack an empty sample run");
        assert_eq!(values.len() % n_time_steps, 0, "values do not split into time steps");
        let unit = values.len() / n_time_steps;
        let gradient_unit = gradients.as_ref().map(|g| {
            assert_eq!(g.len() % n_time_steps, 0, "gradients do not split into time steps");
            g.len() / n_time_steps
        });

        (0..n_time_steps)
            .map(|t| Sample {
                values: DVector::from_column_slice(&values[t * unit..(t + 1) * unit]),
                gradients: gradient_unit.map(|gu| {
                    let g = gradients.as_ref().expect("gradient unit without buffer");
                    DVector::from_column_slice(&g[t * gu..(t + 1) * gu])
                }),
            })
            .collect()
    }

    pub fn n_time_steps(&self) -> usize {
        self.n_time_steps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn gradients(&self) -> Option<&[f64]> {
        self.gradients.as_deref()
    }
}
