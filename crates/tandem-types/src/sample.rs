//! The unit of exchanged data.

use nalgebra::DVector;

/// One sample of a coupled data field: a flat value buffer and, when the
/// field carries spatial derivatives, a flat gradient buffer.
///
/// Values are laid out node-major, then component
/// (`dimensions * vertex_count` entries). Gradients add a derivative
/// direction axis (`dimensions * mesh_dimensions * vertex_count` entries).
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub values: DVector<f64>,
    pub gradients: Option<DVector<f64>>,
}

impl Sample {
    /// Zero-valued sample without gradients.
    pub fn zeros(len: usize) -> Self {
        Self {
            values: DVector::zeros(len),
            gradients: None,
        }
    }

    /// Zero-valued sample with a zero gradient buffer.
    pub fn zeros_with_gradients(len: usize, gradient_len: usize) -> Self {
        Self {
            values: DVector::zeros(len),
            gradients: Some(DVector::zeros(gradient_len)),
        }
    }

    /// Sample owning the given values, without gradients.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            values: DVector::from_vec(values),
            gradients: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_gradients(&self) -> bool {
        self.gradients.is_some()
    }
}
