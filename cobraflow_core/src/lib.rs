//! Orchestration of constraint based metabolic modeling jobs (FBA, FVA and regulated FBA)
//! run by an external pool of solver workers.

pub mod configuration;
pub mod error;
pub mod io;
pub mod jobs;
pub mod metabolic_model;
pub mod optimize;
pub mod orchestrate;
pub mod regulation;
pub mod snapshot;
pub mod transport;
pub mod worker;
mod utils;

#[cfg(test)]
mod test_fixtures;
