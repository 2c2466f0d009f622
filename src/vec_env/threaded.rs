//! One worker thread per environment.
//!
//! Each worker owns its env exclusively. Commands and replies cross a pair
//! of bounded `crossbeam-channel`s; `reset` and `step` send every command
//! first and then wait on every reply, so workers run concurrently between
//! the two. A failing worker never short-circuits the reply drain.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::env::{StepOutcome, WaypointEnv};
use crate::error::EnvError;
use crate::reward::RewardComponent;

use super::{check_batch, env_seed, step_auto_reset, VecEnv, VecStep};

enum Command {
    Reset(Option<u64>),
    Step([f64; 4]),
    Close,
}

enum Reply {
    Reset(Vec<f64>),
    Step(Box<StepOutcome>),
}

struct Worker {
    cmd_tx: Sender<Command>,
    reply_rx: Receiver<Result<Reply, EnvError>>,
    thread: Option<JoinHandle<()>>,
}

fn worker_loop<R: RewardComponent>(
    mut env: WaypointEnv<R>,
    cmd_rx: Receiver<Command>,
    reply_tx: Sender<Result<Reply, EnvError>>,
) {
    while let Ok(cmd) = cmd_rx.recv() {
        let reply = match cmd {
            Command::Reset(seed) => env.reset(seed).map(|(obs, _)| Reply::Reset(obs)),
            Command::Step(action) => {
                step_auto_reset(&mut env, action).map(|out| Reply::Step(Box::new(out)))
            }
            Command::Close => break,
        };
        if reply_tx.send(reply).is_err() {
            break;
        }
    }
}

/// Vector environment with one OS thread per env.
pub struct ThreadedVecEnv {
    workers: Vec<Worker>,
    obs_dim: usize,
    base_seed: u64,
    seeded: bool,
    closed: bool,
}

impl ThreadedVecEnv {
    /// Move each env onto its own named worker thread.
    pub fn new<R: RewardComponent + 'static>(
        envs: Vec<WaypointEnv<R>>,
        base_seed: u64,
    ) -> Result<Self, EnvError> {
        let obs_dim = envs
            .first()
            .map(|env| env.observation_dim())
            .ok_or_else(|| {
                EnvError::InvalidSettings("a vector environment needs at least one env".to_string())
            })?;

        let mut workers = Vec::with_capacity(envs.len());
        for (index, env) in envs.into_iter().enumerate() {
            let (cmd_tx, cmd_rx) = bounded(1);
            let (reply_tx, reply_rx) = bounded(1);
            let thread = thread::Builder::new()
                .name(format!("env-worker-{index}"))
                .spawn(move || worker_loop(env, cmd_rx, reply_tx))
                .map_err(|e| EnvError::Worker {
                    index,
                    message: format!("failed to spawn: {e}"),
                })?;
            workers.push(Worker {
                cmd_tx,
                reply_rx,
                thread: Some(thread),
            });
        }
        log::debug!("spawned {} environment workers", workers.len());

        Ok(Self {
            workers,
            obs_dim,
            base_seed,
            seeded: false,
            closed: false,
        })
    }

    fn send(&self, index: usize, cmd: Command) -> Result<(), EnvError> {
        self.workers[index]
            .cmd_tx
            .send(cmd)
            .map_err(|_| EnvError::Worker {
                index,
                message: "worker disconnected".to_string(),
            })
    }

    fn recv(&self, index: usize) -> Result<Reply, EnvError> {
        match self.workers[index].reply_rx.recv() {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(EnvError::Worker {
                index,
                message: e.to_string(),
            }),
            Err(_) => Err(EnvError::Worker {
                index,
                message: "worker exited".to_string(),
            }),
        }
    }

    /// Send one command per worker, then read back a reply from every worker
    /// that accepted its command. The first failure is returned only after
    /// all replies are drained, so no worker is left holding a stale reply.
    fn round_trip(&self, commands: Vec<Command>) -> Result<Vec<Reply>, EnvError> {
        let mut first_err = None;
        let mut sent = Vec::with_capacity(commands.len());
        for (i, cmd) in commands.into_iter().enumerate() {
            match self.send(i, cmd) {
                Ok(()) => sent.push(i),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        let mut replies = Vec::with_capacity(sent.len());
        for i in sent {
            match self.recv(i) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }

    fn ensure_open(&self) -> Result<(), EnvError> {
        if self.closed {
            Err(EnvError::Closed)
        } else {
            Ok(())
        }
    }
}

impl VecEnv for ThreadedVecEnv {
    fn n_envs(&self) -> usize {
        self.workers.len()
    }

    fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    fn reset(&mut self) -> Result<Vec<Vec<f64>>, EnvError> {
        self.ensure_open()?;
        let commands = (0..self.workers.len())
            .map(|i| Command::Reset((!self.seeded).then(|| env_seed(self.base_seed, i))))
            .collect();
        let obs = self
            .round_trip(commands)?
            .into_iter()
            .enumerate()
            .map(|(index, reply)| match reply {
                Reply::Reset(o) => Ok(o),
                Reply::Step(_) => Err(EnvError::Worker {
                    index,
                    message: "unexpected step reply to reset".to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.seeded = true;
        Ok(obs)
    }

    fn step(&mut self, actions: &[[f64; 4]]) -> Result<VecStep, EnvError> {
        self.ensure_open()?;
        check_batch(self.workers.len(), actions)?;
        let commands = actions.iter().map(|&a| Command::Step(a)).collect();
        let mut batch = VecStep::with_capacity(self.workers.len());
        for (index, reply) in self.round_trip(commands)?.into_iter().enumerate() {
            match reply {
                Reply::Step(out) => batch.push(*out),
                Reply::Reset(_) => {
                    return Err(EnvError::Worker {
                        index,
                        message: "unexpected reset reply to step".to_string(),
                    })
                }
            }
        }
        Ok(batch)
    }

    fn close(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for worker in &self.workers {
            let _ = worker.cmd_tx.send(Command::Close);
        }
        let mut result = Ok(());
        for (index, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.thread.take() {
                if handle.join().is_err() && result.is_ok() {
                    result = Err(EnvError::Worker {
                        index,
                        message: "worker panicked".to_string(),
                    });
                }
            }
        }
        log::debug!("closed {} environment workers", self.workers.len());
        result
    }
}

impl Drop for ThreadedVecEnv {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing vector environment: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::env::EnvSettings;
    use crate::vec_env::{make_envs, SyncVecEnv};

    fn settings() -> EnvSettings {
        EnvSettings::default().with_env(EnvConfig::default().with_max_episode_steps(20))
    }

    #[test]
    fn test_matches_sync_env() {
        let mut threaded = ThreadedVecEnv::new(make_envs(&settings(), 3, 5).unwrap(), 5).unwrap();
        let mut sync = SyncVecEnv::new(make_envs(&settings(), 3, 5).unwrap(), 5).unwrap();

        assert_eq!(threaded.reset().unwrap(), sync.reset().unwrap());
        let actions = [[0.2, 0.1, -0.1, 0.0], [0.0; 4], [1.0, 0.0, 0.0, 0.5]];
        for _ in 0..30 {
            let a = threaded.step(&actions).unwrap();
            let b = sync.step(&actions).unwrap();
            assert_eq!(a, b);
        }
        threaded.close().unwrap();
    }

    #[test]
    fn test_worker_error_leaves_other_replies_drained() {
        let mut envs = make_envs(&settings(), 3, 5).unwrap();
        // Only the first env is never reset, so only its step fails
        for (i, env) in envs.iter_mut().enumerate().skip(1) {
            env.reset(Some(i as u64)).unwrap();
        }
        let mut threaded = ThreadedVecEnv::new(envs, 5).unwrap();
        let err = threaded.step(&[[0.0; 4]; 3]).unwrap_err();
        assert!(matches!(err, EnvError::Worker { index: 0, .. }), "{err:?}");

        // Stale replies would surface here as mismatched reply kinds
        let mut sync = SyncVecEnv::new(make_envs(&settings(), 3, 5).unwrap(), 5).unwrap();
        assert_eq!(threaded.reset().unwrap(), sync.reset().unwrap());
        assert_eq!(
            threaded.step(&[[0.1; 4]; 3]).unwrap(),
            sync.step(&[[0.1; 4]; 3]).unwrap()
        );
    }

    #[test]
    fn test_step_after_close() {
        let mut venv = ThreadedVecEnv::new(make_envs(&settings(), 2, 0).unwrap(), 0).unwrap();
        venv.reset().unwrap();
        venv.close().unwrap();
        assert!(matches!(venv.step(&[[0.0; 4]; 2]), Err(EnvError::Closed)));
        // Idempotent
        venv.close().unwrap();
    }
}
