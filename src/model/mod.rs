//! Data model for the solver.

pub mod types;
