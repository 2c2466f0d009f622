//! In-process vector environment.

use crate::env::WaypointEnv;
use crate::error::EnvError;
use crate::reward::{RewardComponent, ShapedReward};

use super::{check_batch, env_seed, step_auto_reset, VecEnv, VecStep};

/// Steps every env in order on the caller's thread.
pub struct SyncVecEnv<R: RewardComponent = ShapedReward> {
    envs: Vec<WaypointEnv<R>>,
    base_seed: u64,
    seeded: bool,
}

impl<R: RewardComponent> SyncVecEnv<R> {
    pub fn new(envs: Vec<WaypointEnv<R>>, base_seed: u64) -> Result<Self, EnvError> {
        if envs.is_empty() {
            return Err(EnvError::InvalidSettings(
                "a vector environment needs at least one env".to_string(),
            ));
        }
        Ok(Self {
            envs,
            base_seed,
            seeded: false,
        })
    }

    pub fn envs(&self) -> &[WaypointEnv<R>] {
        &self.envs
    }
}

impl<R: RewardComponent + 'static> VecEnv for SyncVecEnv<R> {
    fn n_envs(&self) -> usize {
        self.envs.len()
    }

    fn obs_dim(&self) -> usize {
        self.envs[0].observation_dim()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f64>>, EnvError> {
        let seeded = self.seeded;
        let base = self.base_seed;
        let obs = self
            .envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = (!seeded).then(|| env_seed(base, i));
                env.reset(seed).map(|(obs, _)| obs)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.seeded = true;
        Ok(obs)
    }

    fn step(&mut self, actions: &[[f64; 4]]) -> Result<VecStep, EnvError> {
        check_batch(self.envs.len(), actions)?;
        let mut batch = VecStep::with_capacity(self.envs.len());
        for (env, &action) in self.envs.iter_mut().zip(actions) {
            batch.push(step_auto_reset(env, action)?);
        }
        Ok(batch)
    }

    fn close(&mut self) -> Result<(), EnvError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::env::EnvSettings;
    use crate::vec_env::make_envs;

    fn vec_env(n: usize, max_steps: u64) -> SyncVecEnv {
        let settings = EnvSettings::default()
            .with_env(EnvConfig::deterministic().with_max_episode_steps(max_steps));
        SyncVecEnv::new(make_envs(&settings, n, 10).unwrap(), 10).unwrap()
    }

    #[test]
    fn test_reset_shapes() {
        let mut venv = vec_env(3, 100);
        let obs = venv.reset().unwrap();
        assert_eq!(obs.len(), 3);
        assert!(obs.iter().all(|o| o.len() == 19));
    }

    #[test]
    fn test_wrong_batch_size() {
        let mut venv = vec_env(2, 100);
        venv.reset().unwrap();
        let err = venv.step(&[[0.0; 4]]).unwrap_err();
        assert!(matches!(err, EnvError::BatchSize { expected: 2, got: 1 }));
    }

    #[test]
    fn test_auto_reset_fills_episode_info() {
        let mut venv = vec_env(2, 5);
        venv.reset().unwrap();
        let mut last = None;
        for _ in 0..5 {
            last = Some(venv.step(&[[0.0; 4]; 2]).unwrap());
        }
        let batch = last.unwrap();
        for i in 0..2 {
            assert!(batch.truncated[i]);
            let ep = batch.infos[i].episode.unwrap();
            assert_eq!(ep.length, 5);
            assert!(batch.infos[i].terminal_observation.is_some());
        }
        // Next step belongs to a fresh episode
        let next = venv.step(&[[0.0; 4]; 2]).unwrap();
        assert_eq!(next.infos[0].episode_step, 1);
    }
}
