//! Thin CLI around the simhops library.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use simhops::{ConfigError, EvalOptions, ExperimentConfig, StopFlag};

#[derive(Parser, Debug)]
#[command(name = "simhops", version, about = "Quadcopter waypoint-course RL harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a PPO policy through the configured curriculum.
    Train {
        /// YAML config; defaults apply to every missing key
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Evaluate a saved policy.
    Eval {
        /// Run directory, model directory or policy file
        model_path: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        episodes: usize,
        /// Append per-episode rows to this CSV
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Fly random actions and stream them to the viewer.
    Demo {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig, ConfigError> {
    match path {
        Some(path) => ExperimentConfig::load(path),
        None => Ok(ExperimentConfig::default()),
    }
}

/// 0 on success, 2 on configuration errors, 1 otherwise.
fn exit_with(is_config: bool, message: impl std::fmt::Display) -> ExitCode {
    log::error!("{message}");
    ExitCode::from(if is_config { 2 } else { 1 })
}

fn main() -> ExitCode {
    simhops::logging::init(LevelFilter::Info);
    let cli = Cli::parse();
    let stop = StopFlag::new();
    simhops::interrupt::install_ctrl_c_handler(stop.clone());

    match cli.command {
        Command::Train { config } => {
            let config = match load_config(config.as_deref()) {
                Ok(c) => c,
                Err(e) => return exit_with(true, e),
            };
            match simhops::train(&config, &stop) {
                Ok(report) => {
                    log::info!(
                        "run {} {} after {} timesteps ({} stages); success rate {:.1}%",
                        report.run_id,
                        if report.interrupted { "interrupted" } else { "finished" },
                        report.total_timesteps,
                        report.stages_completed,
                        report.summary.success_metrics.success_rate * 100.0
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => exit_with(e.is_config(), e),
            }
        }
        Command::Eval {
            model_path,
            config,
            episodes,
            output,
            seed,
        } => {
            let config = match load_config(config.as_deref()) {
                Ok(c) => c,
                Err(e) => return exit_with(true, e),
            };
            let mut options = EvalOptions::from_config(&config).with_episodes(episodes);
            options.output_csv = output;
            options.seed = seed;
            match simhops::evaluate(&config, &model_path, &options, &stop) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => exit_with(e.is_config(), e),
            }
        }
        Command::Demo { config } => {
            let config = match load_config(config.as_deref()) {
                Ok(c) => c,
                Err(e) => return exit_with(true, e),
            };
            match simhops::demo(&config, &stop) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => exit_with(e.is_config(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_eval_arguments() {
        let cli = Cli::try_parse_from([
            "simhops", "eval", "runs/run_1", "--episodes", "3", "--seed", "9",
        ])
        .unwrap();
        match cli.command {
            Command::Eval {
                model_path,
                episodes,
                seed,
                config,
                output,
            } => {
                assert_eq!(model_path, PathBuf::from("runs/run_1"));
                assert_eq!(episodes, 3);
                assert_eq!(seed, Some(9));
                assert!(config.is_none() && output.is_none());
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), ExperimentConfig::default());
    }

    #[test]
    fn test_config_errors_exit_with_two() {
        assert_eq!(exit_with(true, "bad"), ExitCode::from(2));
        assert_eq!(exit_with(false, "io"), ExitCode::from(1));
    }
}
