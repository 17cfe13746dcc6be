// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for `scint`: a content- and ABI-keyed cache, a DAG-scheduled
//! install pipeline, and the collaborator seams (§6.5) the binary wires
//! together.

pub mod cache;
pub mod cli;
pub mod config;
pub mod destination;
pub mod error;
pub mod fs;
pub mod materializer;
pub mod planner;
pub mod pool;
pub mod preparer;
pub mod resolved_input;
pub mod runner;
pub mod scheduler;
pub mod types;

pub use error::ScintError;
