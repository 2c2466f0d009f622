//! Generalized Advantage Estimation.
//!
//! A_t = Σ_l (γλ)^l δ_{t+l}, with δ_t = r_t + γ V(s_{t+1}) (1 - done_t) - V(s_t).
//!
//! `done_t` marks a transition that ended its episode, so the value of the
//! following (reset) observation is never bootstrapped across the boundary.
//! Truncated episodes are bootstrapped upstream by folding γ·V(terminal) into
//! the reward.

/// Advantages and returns for one trajectory.
pub fn compute_gae(
    rewards: &[f64],
    values: &[f64],
    dones: &[bool],
    last_value: f64,
    gamma: f64,
    gae_lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n = rewards.len();
    debug_assert_eq!(values.len(), n);
    debug_assert_eq!(dones.len(), n);

    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];
    let mut gae = 0.0;
    let mut next_value = last_value;

    for t in (0..n).rev() {
        let not_done = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_value * not_done - values[t];
        gae = delta + gamma * gae_lambda * not_done * gae;
        advantages[t] = gae;
        returns[t] = gae + values[t];
        next_value = values[t];
    }

    (advantages, returns)
}

/// GAE over interleaved vector-env storage `[env0_t0, env1_t0, ..., env0_t1, ...]`.
pub fn compute_gae_vectorized(
    rewards: &[f64],
    values: &[f64],
    dones: &[bool],
    last_values: &[f64],
    gamma: f64,
    gae_lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n_envs = last_values.len();
    let total = rewards.len();
    let mut advantages = vec![0.0; total];
    let mut returns = vec![0.0; total];
    if n_envs == 0 {
        return (advantages, returns);
    }
    let rollout_len = total / n_envs;

    for env in 0..n_envs {
        let column = |data: &[f64]| -> Vec<f64> {
            (0..rollout_len).map(|t| data[t * n_envs + env]).collect()
        };
        let env_dones: Vec<bool> = (0..rollout_len).map(|t| dones[t * n_envs + env]).collect();
        let (adv, ret) = compute_gae(
            &column(rewards),
            &column(values),
            &env_dones,
            last_values[env],
            gamma,
            gae_lambda,
        );
        for t in 0..rollout_len {
            advantages[t * n_envs + env] = adv[t];
            returns[t * n_envs + env] = ret[t];
        }
    }

    (advantages, returns)
}

/// Zero mean, unit variance. A single element becomes 0.
pub fn normalize_advantages(advantages: &mut [f64]) {
    match advantages.len() {
        0 => {}
        1 => advantages[0] = 0.0,
        len => {
            let n = len as f64;
            let mean = advantages.iter().sum::<f64>() / n;
            let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
            let std = (var + 1e-8).sqrt();
            for a in advantages.iter_mut() {
                *a = (*a - mean) / std;
            }
        }
    }
}

/// 1 - Var[y - ŷ] / Var[y]; 0 when the targets have no variance.
pub fn explained_variance(predicted: &[f64], targets: &[f64]) -> f64 {
    let n = targets.len();
    if n < 2 {
        return 0.0;
    }
    let variance = |xs: &mut dyn Iterator<Item = f64>| {
        let v: Vec<f64> = xs.collect();
        let mean = v.iter().sum::<f64>() / n as f64;
        v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64
    };
    let var_y = variance(&mut targets.iter().copied());
    if var_y < 1e-12 {
        return 0.0;
    }
    let var_diff = variance(&mut targets.iter().zip(predicted).map(|(y, p)| y - p));
    1.0 - var_diff / var_y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gae_lambda_one_is_discounted_return() {
        let (adv, ret) = compute_gae(&[1.0, 1.0, 1.0], &[0.0; 3], &[false; 3], 0.0, 0.5, 1.0);
        assert!((ret[0] - 1.75).abs() < 1e-12);
        assert!((ret[2] - 1.0).abs() < 1e-12);
        assert_eq!(adv, ret);
    }

    #[test]
    fn test_gae_stops_at_done() {
        let (_, ret) = compute_gae(&[1.0, 10.0], &[0.0, 0.0], &[true, false], 100.0, 0.9, 0.95);
        // First transition ended its episode: nothing flows back
        assert!((ret[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_vectorized_matches_per_env() {
        let rewards = [1.0, 2.0, 3.0, 4.0];
        let values = [0.5, 0.1, 0.2, 0.3];
        let dones = [false, false, true, false];
        let (adv, _) = compute_gae_vectorized(&rewards, &values, &dones, &[1.0, 2.0], 0.99, 0.95);
        let (env1, _) = compute_gae(&[2.0, 4.0], &[0.1, 0.3], &[false, false], 2.0, 0.99, 0.95);
        assert!((adv[1] - env1[0]).abs() < 1e-12);
        assert!((adv[3] - env1[1]).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_advantages() {
        let mut adv = vec![1.0, 2.0, 3.0];
        normalize_advantages(&mut adv);
        let mean: f64 = adv.iter().sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
    }

    #[test]
    fn test_explained_variance_perfect_fit() {
        let y = [1.0, 2.0, 4.0];
        assert!((explained_variance(&y, &y) - 1.0).abs() < 1e-12);
        assert_eq!(explained_variance(&[0.0; 3], &[1.0; 3]), 0.0);
    }
}
