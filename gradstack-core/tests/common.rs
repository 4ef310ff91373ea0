use gradstack_core::Tensor;

// Each integration test crate compiles this module separately, so some helpers
// look unused from one crate or another.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Half squared error summed over the batch, and its gradient `y - t` per sample.
#[allow(dead_code)]
pub fn squared_error(y: &[Tensor], t: &[Tensor]) -> (f64, Vec<Tensor>) {
    let mut loss = 0.0;
    let mut grads = Vec::with_capacity(y.len());
    for (ys, ts) in y.iter().zip(t) {
        let diff: Vec<f64> = ys.data().iter().zip(ts.data()).map(|(a, b)| a - b).collect();
        loss += 0.5 * diff.iter().map(|d| d * d).sum::<f64>();
        grads.push(Tensor::from_vec(diff));
    }
    (loss, grads)
}

#[allow(dead_code)]
pub fn rows(data: &[&[f64]]) -> Vec<Tensor> {
    data.iter().map(|r| Tensor::from_vec(r.to_vec())).collect()
}
