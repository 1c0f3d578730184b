//! Shared types for the sessiongate crates: the error enum, structured
//! trace events and the configuration tree.

pub mod config;
pub mod error;
pub mod trace;
