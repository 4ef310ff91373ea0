use crate::error::{GradStackError, Result};
use crate::tensor::Tensor;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The buffers behind a [`Parameter`] handle.
#[derive(Debug)]
pub struct ParameterData {
    pub name: String,
    pub value: Tensor,
    /// Same shape as `value` at all times.
    pub grad: Tensor,
    /// Number of samples whose backward pass has contributed to `grad` since the last reduce.
    pub train_count: usize,
    /// Identifier of the optimizer binding this parameter belongs to, if any.
    pub(crate) binding: Option<u64>,
}

/// A trainable value buffer paired with its gradient buffer.
///
/// `Parameter` is a cheap, cloneable handle. The leaf function that creates a
/// parameter and every composite that republishes it hold clones of the same
/// handle, so an optimizer bound at the composite level mutates the buffers the
/// leaf reads.
#[derive(Clone)]
pub struct Parameter {
    inner: Arc<RwLock<ParameterData>>,
}

impl Parameter {
    /// Creates a parameter with a zero gradient shaped like `value`.
    pub fn new(value: Tensor, name: impl Into<String>) -> Self {
        let grad = Tensor::zeros_like(&value);
        Parameter {
            inner: Arc::new(RwLock::new(ParameterData {
                name: name.into(),
                value,
                grad,
                train_count: 0,
                binding: None,
            })),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, ParameterData>> {
        self.inner.read().map_err(|_| GradStackError::LockError {
            lock_type: "read".to_string(),
            reason: "parameter lock poisoned".to_string(),
        })
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, ParameterData>> {
        self.inner.write().map_err(|_| GradStackError::LockError {
            lock_type: "write".to_string(),
            reason: "parameter lock poisoned".to_string(),
        })
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.read()?.name.clone())
    }

    /// Number of elements of the value buffer.
    pub fn numel(&self) -> Result<usize> {
        Ok(self.read()?.value.numel())
    }

    pub fn train_count(&self) -> Result<usize> {
        Ok(self.read()?.train_count)
    }

    /// Returns a copy of the value buffer.
    pub fn value(&self) -> Result<Tensor> {
        Ok(self.read()?.value.clone())
    }

    /// Returns a copy of the gradient buffer.
    pub fn grad(&self) -> Result<Tensor> {
        Ok(self.read()?.grad.clone())
    }

    /// Overwrites the value buffer; `data` must have exactly `numel()` elements.
    pub fn set_value(&self, data: &[f64]) -> Result<()> {
        let mut guard = self.write()?;
        guard.value.ensure_numel(data.len(), "Parameter::set_value")?;
        guard.value.data_mut().copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn add_train_count(&self, count: usize) -> Result<()> {
        self.write()?.train_count += count;
        Ok(())
    }

    /// Zeroes the gradient buffer.
    pub fn clear_grad(&self) -> Result<()> {
        self.write()?.grad.fill(0.0);
        Ok(())
    }

    /// Divides the accumulated gradient by the train count, then resets the count.
    pub fn reduce(&self) -> Result<()> {
        let mut guard = self.write()?;
        if guard.train_count > 0 {
            let factor = 1.0 / guard.train_count as f64;
            guard.grad.scale(factor);
            guard.train_count = 0;
        }
        Ok(())
    }

    /// Returns `true` if both handles point at the same buffers.
    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.read() {
            Ok(data) => write!(
                f,
                "Parameter({}, shape={:?}, train_count={})",
                data.name,
                data.value.shape(),
                data.train_count
            ),
            Err(_) => write!(f, "Parameter(<poisoned>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_parameter_has_zero_grad() {
        let p = Parameter::new(Tensor::from_vec(vec![1.0, 2.0, 3.0]), "w");
        let data = p.read().unwrap();
        assert_eq!(data.grad.shape(), data.value.shape());
        assert!(data.grad.data().iter().all(|&g| g == 0.0));
        assert_eq!(data.train_count, 0);
        assert_eq!(data.name, "w");
    }

    #[test]
    fn test_reduce_averages_and_resets_count() {
        let p = Parameter::new(Tensor::zeros(&[2]), "w");
        {
            let mut data = p.write().unwrap();
            data.grad.data_mut().copy_from_slice(&[4.0, -2.0]);
            data.train_count = 4;
        }
        p.reduce().unwrap();
        assert_eq!(p.grad().unwrap().data(), &[1.0, -0.5]);
        assert_eq!(p.train_count().unwrap(), 0);

        // A second reduce with a zero count leaves the gradient alone.
        p.reduce().unwrap();
        assert_eq!(p.grad().unwrap().data(), &[1.0, -0.5]);
    }

    #[test]
    fn test_clones_share_buffers() {
        let p = Parameter::new(Tensor::zeros(&[2]), "w");
        let alias = p.clone();
        alias.set_value(&[1.0, 2.0]).unwrap();
        assert_eq!(p.value().unwrap().data(), &[1.0, 2.0]);
        assert!(p.ptr_eq(&alias));
        assert!(!p.ptr_eq(&Parameter::new(Tensor::zeros(&[2]), "w")));
    }

    #[test]
    fn test_set_value_checks_length() {
        let p = Parameter::new(Tensor::zeros(&[2, 2]), "w");
        assert!(matches!(
            p.set_value(&[1.0]),
            Err(GradStackError::ShapeMismatch { .. })
        ));
    }
}
