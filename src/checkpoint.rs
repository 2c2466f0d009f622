//! Model checkpointing.
//!
//! A checkpoint is a policy file plus the normalizer statistics saved at the
//! same step. Periodic checkpoints of stage `k` live under
//! `checkpoints/stage_<k>/` as
//! `ppo_quadcopter_stage_<k>_<steps>_steps.json` with
//! `ppo_quadcopter_stage_<k>_vecnormalize_<steps>_steps.json` alongside.
//! Model directories (`best_model/`, `final_model/`) hold `policy.json` and
//! `normalizer.json`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CheckpointError;
use crate::learner::Policy;
use crate::normalization::NormalizerState;

pub const POLICY_FILE: &str = "policy.json";
pub const NORMALIZER_FILE: &str = "normalizer.json";

/// Policy and normalizer file pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelFiles {
    pub policy: PathBuf,
    pub normalizer: Option<PathBuf>,
}

impl ModelFiles {
    /// Files of a model directory.
    pub fn in_dir(dir: &Path) -> Self {
        let normalizer = dir.join(NORMALIZER_FILE);
        Self {
            policy: dir.join(POLICY_FILE),
            normalizer: normalizer.exists().then_some(normalizer),
        }
    }

    /// Locate a policy under `model_path`: the path itself when it is a
    /// file, else `model_path`, `model_path/final_model` and
    /// `model_path/best_model` are searched for `policy.json`.
    pub fn resolve(model_path: &Path) -> Option<Self> {
        if model_path.is_file() {
            let normalizer = model_path
                .parent()
                .map(|p| p.join(NORMALIZER_FILE))
                .filter(|p| p.exists());
            return Some(Self {
                policy: model_path.to_path_buf(),
                normalizer,
            });
        }
        [
            model_path.to_path_buf(),
            model_path.join("final_model"),
            model_path.join("best_model"),
        ]
        .iter()
        .map(|dir| Self::in_dir(dir))
        .find(|files| files.policy.exists())
    }
}

/// Write `policy.json` and `normalizer.json` into `dir`.
pub fn save_model_dir(
    dir: &Path,
    policy: &dyn Policy,
    normalizer: &NormalizerState,
) -> Result<ModelFiles, CheckpointError> {
    fs::create_dir_all(dir)?;
    let files = ModelFiles {
        policy: dir.join(POLICY_FILE),
        normalizer: Some(dir.join(NORMALIZER_FILE)),
    };
    policy.save(&files.policy)?;
    normalizer.save(&dir.join(NORMALIZER_FILE))?;
    Ok(files)
}

/// Checkpoint metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub files: ModelFiles,
    /// Global timestep at save time
    pub step: u64,
}

/// Periodic checkpoint writer for one curriculum stage.
pub struct Checkpointer {
    dir: PathBuf,
    prefix: String,
    /// Vector steps between saves
    save_interval: u64,
    /// Checkpoints to keep (0 = all)
    keep_last_n: usize,
    history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Create the checkpointer for stage `stage` (1-based) under
    /// `<run>/checkpoints/stage_<stage>/`, creating the directory.
    pub fn for_stage(run_dir: &Path, stage: usize, save_interval: u64) -> Result<Self, CheckpointError> {
        let dir = run_dir.join("checkpoints").join(format!("stage_{stage}"));
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: format!("ppo_quadcopter_stage_{stage}"),
            save_interval: save_interval.max(1),
            keep_last_n: 0,
            history: Vec::new(),
        })
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True every `save_interval` vector steps.
    pub fn should_save(&self, n_calls: u64) -> bool {
        n_calls > 0 && n_calls % self.save_interval == 0
    }

    pub fn paths_for(&self, step: u64) -> ModelFiles {
        ModelFiles {
            policy: self.dir.join(format!("{}_{}_steps.json", self.prefix, step)),
            normalizer: Some(
                self.dir
                    .join(format!("{}_vecnormalize_{}_steps.json", self.prefix, step)),
            ),
        }
    }

    pub fn save(
        &mut self,
        policy: &dyn Policy,
        normalizer: &NormalizerState,
        step: u64,
    ) -> Result<CheckpointInfo, CheckpointError> {
        let files = self.paths_for(step);
        policy.save(&files.policy)?;
        if let Some(path) = &files.normalizer {
            normalizer.save(path)?;
        }
        log::info!("saved checkpoint {}", files.policy.display());

        let info = CheckpointInfo { files, step };
        self.history.push(info.clone());
        self.cleanup_old_checkpoints();
        Ok(info)
    }

    /// Saved checkpoints in this directory, ordered by step.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let policy_prefix = format!("{}_", self.prefix);
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let step = name
                    .strip_prefix(&policy_prefix)?
                    .strip_suffix("_steps.json")?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo {
                    files: self.paths_for(step),
                    step,
                })
            })
            .collect();
        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        self.list_checkpoints()?
            .pop()
            .ok_or_else(|| CheckpointError::NoCheckpoints(self.dir.clone()))
    }

    fn cleanup_old_checkpoints(&mut self) {
        if self.keep_last_n == 0 {
            return;
        }
        while self.history.len() > self.keep_last_n {
            let old = self.history.remove(0);
            let _ = fs::remove_file(&old.files.policy);
            if let Some(path) = &old.files.normalizer {
                let _ = fs::remove_file(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VecNormalizeConfig;
    use tempfile::tempdir;

    struct FixedPolicy;

    impl Policy for FixedPolicy {
        fn obs_dim(&self) -> usize {
            19
        }

        fn num_timesteps(&self) -> u64 {
            0
        }

        fn act(&self, _obs: &[f64]) -> [f64; 4] {
            [0.0; 4]
        }

        fn save(&self, path: &Path) -> Result<(), CheckpointError> {
            fs::write(path, "{}")?;
            Ok(())
        }
    }

    fn normalizer() -> NormalizerState {
        NormalizerState::new(19, &VecNormalizeConfig::default(), 0.99)
    }

    #[test]
    fn test_should_save() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::for_stage(dir.path(), 1, 100).unwrap();
        assert!(!ckpt.should_save(0));
        assert!(!ckpt.should_save(50));
        assert!(ckpt.should_save(100));
        assert!(ckpt.should_save(200));
    }

    #[test]
    fn test_checkpoint_file_names() {
        let dir = tempdir().unwrap();
        let mut ckpt = Checkpointer::for_stage(dir.path(), 2, 10).unwrap();
        let info = ckpt.save(&FixedPolicy, &normalizer(), 4000).unwrap();
        let stage_dir = dir.path().join("checkpoints").join("stage_2");
        assert_eq!(
            info.files.policy,
            stage_dir.join("ppo_quadcopter_stage_2_4000_steps.json")
        );
        assert!(stage_dir
            .join("ppo_quadcopter_stage_2_vecnormalize_4000_steps.json")
            .exists());
    }

    #[test]
    fn test_latest_ignores_normalizer_files() {
        let dir = tempdir().unwrap();
        let mut ckpt = Checkpointer::for_stage(dir.path(), 1, 10).unwrap();
        assert!(matches!(
            ckpt.find_latest_checkpoint(),
            Err(CheckpointError::NoCheckpoints(_))
        ));
        for step in [100, 2000, 300] {
            ckpt.save(&FixedPolicy, &normalizer(), step).unwrap();
        }
        let all = ckpt.list_checkpoints().unwrap();
        assert_eq!(all.iter().map(|c| c.step).collect::<Vec<_>>(), vec![100, 300, 2000]);
        assert_eq!(ckpt.find_latest_checkpoint().unwrap().step, 2000);
    }

    #[test]
    fn test_keep_last_n() {
        let dir = tempdir().unwrap();
        let mut ckpt = Checkpointer::for_stage(dir.path(), 1, 10)
            .unwrap()
            .with_keep_last_n(1);
        let first = ckpt.save(&FixedPolicy, &normalizer(), 10).unwrap();
        ckpt.save(&FixedPolicy, &normalizer(), 20).unwrap();
        assert!(!first.files.policy.exists());
        assert_eq!(ckpt.list_checkpoints().unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_model_dirs() {
        let dir = tempdir().unwrap();
        assert!(ModelFiles::resolve(dir.path()).is_none());
        let best = dir.path().join("best_model");
        save_model_dir(&best, &FixedPolicy, &normalizer()).unwrap();
        let found = ModelFiles::resolve(dir.path()).unwrap();
        assert_eq!(found.policy, best.join(POLICY_FILE));
        assert_eq!(found.normalizer, Some(best.join(NORMALIZER_FILE)));

        // final_model wins over best_model
        let fin = dir.path().join("final_model");
        save_model_dir(&fin, &FixedPolicy, &normalizer()).unwrap();
        assert_eq!(ModelFiles::resolve(dir.path()).unwrap().policy, fin.join(POLICY_FILE));
    }
}
