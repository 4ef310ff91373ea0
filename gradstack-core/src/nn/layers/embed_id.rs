use crate::error::{GradStackError, Result};
use crate::nn::function::{ensure_batch_len, Function, FunctionBase};
use crate::nn::history::BatchHistory;
use crate::nn::init::init_or_copy_;
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;
use log::debug;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct EmbedIdConfig {
    /// Row-major `[vocab, out]` table copied in instead of a random draw.
    pub initial_weight: Option<Vec<f64>>,
    pub name: String,
}

impl Default for EmbedIdConfig {
    fn default() -> Self {
        EmbedIdConfig {
            initial_weight: None,
            name: "EmbedID".to_string(),
        }
    }
}

/// Embedding lookup: each id in the input selects one row of the table.
///
/// An input tensor of `n` ids yields an output of shape `[n, out]`. The ids are
/// not differentiable, so the input gradient is always zero.
#[derive(Debug)]
pub struct EmbedId {
    base: FunctionBase,
    weight: Parameter,
    inputs: BatchHistory,
}

impl EmbedId {
    pub fn new<R>(vocab_size: usize, out_features: usize, config: EmbedIdConfig, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        let mut table = Tensor::zeros(&[vocab_size, out_features]);
        init_or_copy_(
            &mut table,
            config.initial_weight.as_deref(),
            rng,
            &format!("{} weight init", config.name),
        )?;
        let weight = Parameter::new(table, format!("{}.weight", config.name));
        debug!(
            "{}: created EmbedID vocab={} out={}",
            config.name, vocab_size, out_features
        );
        Ok(EmbedId {
            base: FunctionBase::new(config.name, vocab_size, out_features, false)
                .with_parameters(vec![weight.clone()]),
            weight,
            inputs: BatchHistory::new(),
        })
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    fn row_index(&self, id: f64) -> Result<usize> {
        let vocab = self.base.input_count();
        if id < 0.0 || id.fract() != 0.0 || id >= vocab as f64 {
            return Err(GradStackError::InvalidIndex {
                value: id,
                len: vocab,
            });
        }
        Ok(id as usize)
    }

    fn lookup(&self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        let out = self.base.output_count();
        let weight = self.weight.read()?;
        let table = weight.value.data();
        let mut y = Vec::with_capacity(x.len());
        for ids in x {
            let mut rows = Vec::with_capacity(ids.numel() * out);
            for &id in ids.data() {
                let row = self.row_index(id)?;
                rows.extend_from_slice(&table[row * out..(row + 1) * out]);
            }
            y.push(Tensor::new(rows, vec![ids.numel(), out])?);
        }
        Ok(y)
    }
}

impl Function for EmbedId {
    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }

    fn forward_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        let y = self.lookup(x)?;
        self.inputs.push(x.to_vec());
        Ok(y)
    }

    fn backward_batch(&mut self, gy: &[Tensor]) -> Result<Vec<Tensor>> {
        let name = self.base.name();
        let out = self.base.output_count();
        let x = self.inputs.peek(name)?;
        ensure_batch_len(x.len(), gy.len(), name)?;
        for (ids, g) in x.iter().zip(gy) {
            g.ensure_numel(ids.numel() * out, name)?;
        }

        {
            let mut guard = self.weight.write()?;
            let grad = guard.grad.data_mut();
            for (ids, g) in x.iter().zip(gy) {
                for (i, &id) in ids.data().iter().enumerate() {
                    // Ids were validated when the lookup ran.
                    let row = id as usize;
                    for (acc, gv) in grad[row * out..(row + 1) * out]
                        .iter_mut()
                        .zip(&g.data()[i * out..(i + 1) * out])
                    {
                        *acc += gv;
                    }
                }
            }
        }

        let gx: Vec<Tensor> = x.iter().map(Tensor::zeros_like).collect();
        self.inputs.pop(name)?;
        Ok(gx)
    }

    fn predict_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        self.lookup(x)
    }

    fn reset_state(&mut self) {
        self.inputs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table() -> EmbedId {
        EmbedId::new(
            3,
            2,
            EmbedIdConfig {
                initial_weight: Some(vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]),
                ..EmbedIdConfig::default()
            },
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap()
    }

    #[test]
    fn test_embed_lookup_copies_rows() {
        let mut embed = table();
        let y = embed.forward_one(&Tensor::from_vec(vec![2.0, 0.0])).unwrap();
        assert_eq!(y.shape(), &[2, 2]);
        assert_eq!(y.data(), &[20.0, 21.0, 0.0, 1.0]);
    }

    #[test]
    fn test_embed_backward_accumulates_rows() {
        let mut embed = table();
        embed.forward_one(&Tensor::from_vec(vec![1.0, 1.0])).unwrap();
        let g = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let gx = embed.backward_one(&g).unwrap();
        assert_eq!(gx.data(), &[0.0, 0.0]);
        assert_eq!(
            embed.weight().grad().unwrap().data(),
            &[0.0, 0.0, 4.0, 6.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_embed_rejects_invalid_ids() {
        let mut embed = table();
        for bad in [3.0, -1.0, 0.5] {
            assert_eq!(
                embed.forward_one(&Tensor::from_vec(vec![bad])),
                Err(GradStackError::InvalidIndex { value: bad, len: 3 })
            );
        }
        assert!(embed.backward_one(&Tensor::zeros(&[1, 2])).is_err());
    }
}
