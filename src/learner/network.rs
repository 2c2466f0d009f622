//! Actor-critic networks as burn modules.
//!
//! The policy maps an observation through tanh hidden layers to the mean of
//! a diagonal Gaussian with a state-independent log-std parameter. The value
//! network has its own tanh trunk and a scalar head.
//!
//! Weights use orthogonal initialization: gain √2 for hidden layers, 0.01
//! for the action head, 1.0 for the value head. The random draws come from
//! the learner's seeded RNG so a seed reproduces the initial policy.

use burn::backend::{Autodiff, NdArray};
use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::constants::ACTION_DIM;

/// Backend for rollouts, evaluation and inference.
pub type InferenceBackend = NdArray<f32>;
/// Backend for gradient updates.
pub type TrainBackend = Autodiff<InferenceBackend>;

pub const LOG_2PI: f64 = 1.837_877_066_409_345_3;

const LOG_STD_MIN: f64 = -20.0;
const LOG_STD_MAX: f64 = 2.0;

// ============================================================================
// Orthogonal linear layer
// ============================================================================

/// Dense layer `y = x Wᵀ + b` with orthogonally initialized weights.
#[derive(Module, Debug)]
pub struct OrthogonalLinear<B: Backend> {
    /// `[d_output, d_input]`
    pub weight: Param<Tensor<B, 2>>,
    pub bias: Param<Tensor<B, 1>>,
    d_input: usize,
    d_output: usize,
}

impl<B: Backend> OrthogonalLinear<B> {
    pub fn new<R: Rng + ?Sized>(
        d_input: usize,
        d_output: usize,
        gain: f64,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let weights = orthogonal_matrix(d_output, d_input, gain, rng);
        let weight = Tensor::<B, 1>::from_floats(weights.as_slice(), device).reshape([d_output, d_input]);
        Self {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([d_output], device)),
            d_input,
            d_output,
        }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        input.matmul(self.weight.val().transpose()) + self.bias.val().unsqueeze_dim(0)
    }

    pub fn d_input(&self) -> usize {
        self.d_input
    }

    pub fn d_output(&self) -> usize {
        self.d_output
    }
}

/// Row-major `rows × cols` matrix with orthonormal rows or columns
/// (whichever is fewer), scaled by `gain`. Gram-Schmidt on Gaussian draws.
fn orthogonal_matrix<R: Rng + ?Sized>(rows: usize, cols: usize, gain: f64, rng: &mut R) -> Vec<f32> {
    let long = rows.max(cols);
    let short = rows.min(cols);
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(short);
    for _ in 0..short {
        let mut v: Vec<f64> = (0..long).map(|_| StandardNormal.sample(rng)).collect();
        for b in &basis {
            let proj: f64 = v.iter().zip(b).map(|(x, y)| x * y).sum();
            v.iter_mut().zip(b).for_each(|(x, y)| *x -= proj * y);
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt().max(1e-12);
        v.iter_mut().for_each(|x| *x /= norm);
        basis.push(v);
    }

    let mut m = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            // basis[k][j]: k indexes the short side
            let entry = if rows >= cols { basis[c][r] } else { basis[r][c] };
            m.push((gain * entry) as f32);
        }
    }
    m
}

// ============================================================================
// MLP / actor-critic
// ============================================================================

/// tanh hidden layers, linear output.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<OrthogonalLinear<B>>,
}

impl<B: Backend> Mlp<B> {
    pub fn new<R: Rng + ?Sized>(
        in_dim: usize,
        hidden: &[usize],
        out_dim: usize,
        out_gain: f64,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut prev = in_dim;
        for &width in hidden {
            layers.push(OrthogonalLinear::new(prev, width, std::f64::consts::SQRT_2, rng, device));
            prev = width;
        }
        layers.push(OrthogonalLinear::new(prev, out_dim, out_gain, rng, device));
        Self { layers }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        self.layers
            .iter()
            .enumerate()
            .fold(input, |x, (i, layer)| {
                let y = layer.forward(x);
                if i < last {
                    tanh(y)
                } else {
                    y
                }
            })
    }

    pub fn in_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.d_input())
    }

    pub fn hidden_sizes(&self) -> Vec<usize> {
        let n = self.layers.len().saturating_sub(1);
        self.layers[..n].iter().map(|l| l.d_output()).collect()
    }
}

#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    pub pi: Mlp<B>,
    pub vf: Mlp<B>,
    pub log_std: Param<Tensor<B, 1>>,
}

impl<B: Backend> ActorCritic<B> {
    pub fn new<R: Rng + ?Sized>(
        obs_dim: usize,
        pi_hidden: &[usize],
        vf_hidden: &[usize],
        log_std_init: f64,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        Self {
            pi: Mlp::new(obs_dim, pi_hidden, ACTION_DIM, 0.01, rng, device),
            vf: Mlp::new(obs_dim, vf_hidden, 1, 1.0, rng, device),
            log_std: Param::from_tensor(Tensor::full([ACTION_DIM], log_std_init, device)),
        }
    }

    pub fn obs_dim(&self) -> usize {
        self.pi.in_dim()
    }

    /// `[batch, obs_dim]` to `[batch, ACTION_DIM]`.
    pub fn action_mean(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.pi.forward(obs)
    }

    /// `[batch, obs_dim]` to `[batch]`.
    pub fn value(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = obs.dims();
        self.vf.forward(obs).reshape([batch])
    }

    pub fn log_std(&self) -> Tensor<B, 1> {
        self.log_std.val().clamp(LOG_STD_MIN, LOG_STD_MAX)
    }

    /// Diagonal Gaussian log-density of `actions` around `mean`, summed over
    /// action dimensions: `[batch]`.
    pub fn log_prob(&self, mean: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = mean.dims();
        let log_std = self.log_std().unsqueeze_dim::<2>(0);
        let z = (actions - mean) / log_std.clone().exp();
        let per_dim = (z.powf_scalar(2.0).mul_scalar(-0.5) - log_std).sub_scalar(0.5 * LOG_2PI);
        per_dim.sum_dim(1).reshape([batch])
    }

    /// `Σ log_std + D/2 (1 + ln 2π)`, shape `[1]`.
    pub fn entropy(&self) -> Tensor<B, 1> {
        self.log_std()
            .sum()
            .add_scalar(0.5 * ACTION_DIM as f64 * (1.0 + LOG_2PI))
    }

    // --- host-side helpers over plain observation rows ---

    /// Action means and values for a batch of observations.
    pub fn evaluate(&self, obs: &[Vec<f64>], device: &B::Device) -> (Vec<[f64; ACTION_DIM]>, Vec<f64>) {
        let input = rows_tensor::<B, _>(obs.iter().map(Vec::as_slice), self.obs_dim(), device);
        let means = to_host(self.action_mean(input.clone()));
        let values = to_host(self.value(input));
        (action_rows(&means), values)
    }

    pub fn values(&self, obs: &[Vec<f64>], device: &B::Device) -> Vec<f64> {
        let input = rows_tensor::<B, _>(obs.iter().map(Vec::as_slice), self.obs_dim(), device);
        to_host(self.value(input))
    }

    pub fn log_std_values(&self) -> [f64; ACTION_DIM] {
        let host = to_host(self.log_std());
        let mut out = [0.0; ACTION_DIM];
        out.iter_mut().zip(host).for_each(|(o, v)| *o = v);
        out
    }

    /// Mean action clipped to the action box.
    pub fn deterministic_action(&self, obs: &[f64], device: &B::Device) -> [f64; ACTION_DIM] {
        let input = rows_tensor::<B, _>(std::iter::once(obs), self.obs_dim(), device);
        let mean = to_host(self.action_mean(input));
        let mut action = [0.0; ACTION_DIM];
        for (a, m) in action.iter_mut().zip(mean) {
            *a = m.clamp(-1.0, 1.0);
        }
        action
    }
}

/// Gaussian draw around `mean`. Returns the unclipped action and its log-prob.
pub fn sample_action<R: Rng + ?Sized>(
    mean: &[f64; ACTION_DIM],
    log_std: &[f64; ACTION_DIM],
    rng: &mut R,
) -> ([f64; ACTION_DIM], f64) {
    let mut action = [0.0; ACTION_DIM];
    let mut log_prob = 0.0;
    for j in 0..ACTION_DIM {
        let z: f64 = StandardNormal.sample(rng);
        action[j] = mean[j] + log_std[j].exp() * z;
        log_prob += -0.5 * z * z - log_std[j] - 0.5 * LOG_2PI;
    }
    (action, log_prob)
}

// ============================================================================
// Host <-> tensor
// ============================================================================

/// Stack equally wide rows into a `[rows, width]` tensor.
pub fn rows_tensor<'a, B: Backend, I>(rows: I, width: usize, device: &B::Device) -> Tensor<B, 2>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let flat: Vec<f32> = rows
        .into_iter()
        .flat_map(|row| row.iter().map(|&v| v as f32))
        .collect();
    let n = flat.len() / width.max(1);
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([n, width])
}

pub fn vector_tensor<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 1> {
    let flat: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device)
}

/// Copy a tensor back to the host in row-major order.
pub fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    let values: Vec<f64> = tensor.into_data().iter::<f32>().map(f64::from).collect();
    values
}

fn action_rows(flat: &[f64]) -> Vec<[f64; ACTION_DIM]> {
    flat.chunks_exact(ACTION_DIM)
        .map(|c| {
            let mut row = [0.0; ACTION_DIM];
            row.copy_from_slice(c);
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type B = InferenceBackend;

    fn model(obs_dim: usize, seed: u64) -> ActorCritic<B> {
        let mut rng = StdRng::seed_from_u64(seed);
        ActorCritic::new(obs_dim, &[16], &[16], 0.0, &mut rng, &Default::default())
    }

    #[test]
    fn test_orthogonal_rows() {
        let mut rng = StdRng::seed_from_u64(0);
        let m = orthogonal_matrix(3, 5, 1.0, &mut rng);
        for a in 0..3 {
            for b in 0..3 {
                let dot: f32 = (0..5).map(|c| m[a * 5 + c] * m[b * 5 + c]).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_same_seed_same_weights() {
        let obs = vec![vec![0.2; 7]];
        let device = Default::default();
        assert_eq!(model(7, 5).evaluate(&obs, &device), model(7, 5).evaluate(&obs, &device));
        assert_ne!(model(7, 5).evaluate(&obs, &device).1, model(7, 6).evaluate(&obs, &device).1);
    }

    #[test]
    fn test_batch_shapes() {
        let ac = model(5, 1);
        let obs = vec![vec![0.1; 5], vec![-0.4; 5], vec![1.0; 5]];
        let (means, values) = ac.evaluate(&obs, &Default::default());
        assert_eq!(means.len(), 3);
        assert_eq!(values.len(), 3);
        assert_eq!(ac.pi.hidden_sizes(), vec![16]);
        assert_eq!(ac.obs_dim(), 5);
    }

    #[test]
    fn test_log_prob_of_mean() {
        let ac = model(4, 1);
        let device = Default::default();
        let obs = rows_tensor::<B, _>([[0.0; 4].as_slice()], 4, &device);
        let mean = ac.action_mean(obs);
        let lp: f32 = ac.log_prob(mean.clone(), mean).into_scalar().elem();
        assert!((lp as f64 - (-2.0 * LOG_2PI)).abs() < 1e-4);
        let entropy: f32 = ac.entropy().into_scalar().elem();
        assert!((entropy as f64 - 4.0 * (0.5 + 0.5 * LOG_2PI)).abs() < 1e-4);
    }

    #[test]
    fn test_sampled_log_prob_matches_tensor_density() {
        let ac = model(3, 2);
        let device = Default::default();
        let obs = vec![vec![0.3, -0.1, 0.5]];
        let (means, _) = ac.evaluate(&obs, &device);
        let mut rng = StdRng::seed_from_u64(9);
        let (action, host_lp) = sample_action(&means[0], &ac.log_std_values(), &mut rng);

        let mean = ac.action_mean(rows_tensor::<B, _>(obs.iter().map(Vec::as_slice), 3, &device));
        let actions = rows_tensor::<B, _>([action.as_slice()], ACTION_DIM, &device);
        let lp: f32 = ac.log_prob(mean, actions).into_scalar().elem();
        assert!((lp as f64 - host_lp).abs() < 1e-3);
    }

    #[test]
    fn test_deterministic_action_in_box() {
        let ac = model(19, 2);
        let a = ac.deterministic_action(&[100.0; 19], &Default::default());
        assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}
