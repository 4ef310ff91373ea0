use crate::error::{GradStackError, Result};
use crate::tensor::Tensor;

/// Last-in-first-out record of the batches a function saw in forward.
///
/// Each forward call pushes one entry and the matching backward call pops it,
/// so backward consumes entries in reverse temporal order.
#[derive(Debug, Default, Clone)]
pub struct BatchHistory {
    entries: Vec<Vec<Tensor>>,
}

impl BatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: Vec<Tensor>) {
        self.entries.push(batch);
    }

    /// Returns the most recent entry without removing it.
    pub fn peek(&self, function: &str) -> Result<&[Tensor]> {
        self.entries
            .last()
            .map(Vec::as_slice)
            .ok_or_else(|| missing_forward_state(function))
    }

    /// Removes and returns the most recent entry.
    ///
    /// # Errors
    /// `MissingForwardState` if no entry is outstanding.
    pub fn pop(&mut self, function: &str) -> Result<Vec<Tensor>> {
        self.entries
            .pop()
            .ok_or_else(|| missing_forward_state(function))
    }

    /// Number of outstanding entries.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub(crate) fn missing_forward_state(function: &str) -> GradStackError {
    GradStackError::MissingForwardState {
        function: function.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_lifo() {
        let mut history = BatchHistory::new();
        history.push(vec![Tensor::from_vec(vec![1.0])]);
        history.push(vec![Tensor::from_vec(vec![2.0])]);
        assert_eq!(history.depth(), 2);
        assert_eq!(history.peek("f").unwrap()[0].data(), &[2.0]);
        assert_eq!(history.pop("f").unwrap()[0].data(), &[2.0]);
        assert_eq!(history.pop("f").unwrap()[0].data(), &[1.0]);
        assert_eq!(history.depth(), 0);
    }

    #[test]
    fn test_pop_empty_is_missing_forward_state() {
        let mut history = BatchHistory::new();
        assert_eq!(
            history.pop("layer"),
            Err(GradStackError::MissingForwardState {
                function: "layer".to_string()
            })
        );
        assert!(history.peek("layer").is_err());
    }
}
