//! Model Output Validation
//!
//! JSON recovery for model responses. Stages pass every raw completion
//! through [`JsonRecovery`] before building their typed result, then apply
//! stage-specific defaulting for any field the recovery left out.

mod json_repair;

pub use json_repair::{JsonRecovery, Recovered, recover_json, recover_value};
