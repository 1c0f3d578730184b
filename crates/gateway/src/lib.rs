pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod services;
pub mod state;
pub mod tools;
