//! Behavioral tests across module boundaries.
//!
//! ## Organization
//!
//! - `physics_tests`: quadcopter flight and sensor sampling
//! - `environment_tests`: reset/step contract, rewards and determinism
//! - `termination_tests`: how episodes end
//! - `edge_case_tests`: clipping, invalid input and vector-env plumbing
//! - `integration_tests`: training, resume and evaluation runs on disk

pub mod environment_tests;
pub mod termination_tests;
