// src/tensor.rs

use crate::error::{GradStackError, Result};
use std::fmt;

/// A dense, row-major `f64` tensor.
///
/// The tensor owns its flat buffer and its shape. The invariant
/// `data.len() == shape.iter().product()` holds at all times; every constructor
/// and every reshape checks it.
///
/// There is no broadcasting: combining two tensors elementwise requires equal shapes.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    /// Creates a tensor from an existing flat buffer and a shape.
    ///
    /// # Errors
    /// `ShapeMismatch` if `data.len()` differs from the product of `shape`.
    pub fn new(data: Vec<f64>, shape: Vec<usize>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(GradStackError::ShapeMismatch {
                expected: shape,
                actual: vec![data.len()],
                operation: "Tensor::new".to_string(),
            });
        }
        Ok(Tensor { shape, data })
    }

    /// Creates a 1-D tensor wrapping `data`.
    pub fn from_vec(data: Vec<f64>) -> Self {
        let shape = vec![data.len()];
        Tensor { shape, data }
    }

    /// Creates a zero-filled tensor with the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let numel = shape.iter().product();
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; numel],
        }
    }

    /// Creates a zero-filled tensor with the same shape as `other`.
    pub fn zeros_like(other: &Tensor) -> Self {
        Tensor::zeros(&other.shape)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Reads the element at flat index `index`.
    pub fn get(&self, index: usize) -> Result<f64> {
        self.data
            .get(index)
            .copied()
            .ok_or(GradStackError::IndexOutOfBounds {
                index,
                len: self.data.len(),
            })
    }

    /// Writes the element at flat index `index`.
    pub fn set(&mut self, index: usize, value: f64) -> Result<()> {
        let len = self.data.len();
        match self.data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(GradStackError::IndexOutOfBounds { index, len }),
        }
    }

    /// Changes the shape in place. The buffer is never reallocated.
    ///
    /// # Errors
    /// `ShapeMismatch` if the new shape does not hold exactly `numel()` elements.
    pub fn reshape(&mut self, shape: &[usize]) -> Result<()> {
        let numel: usize = shape.iter().product();
        if numel != self.data.len() {
            return Err(GradStackError::shape_mismatch(&self.shape, shape, "reshape"));
        }
        self.shape = shape.to_vec();
        Ok(())
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|x| *x *= factor);
    }

    /// Elementwise `self += other`.
    ///
    /// # Errors
    /// `ShapeMismatch` if the shapes differ.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(GradStackError::shape_mismatch(
                &self.shape,
                &other.shape,
                "add_assign",
            ));
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += *b;
        }
        Ok(())
    }

    /// Checks that the tensor holds exactly `expected` elements.
    pub(crate) fn ensure_numel(&self, expected: usize, operation: &str) -> Result<()> {
        if self.data.len() != expected {
            return Err(GradStackError::shape_mismatch(
                &[expected],
                &[self.data.len()],
                operation,
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
#[path = "tensor_test.rs"]
mod tests;
