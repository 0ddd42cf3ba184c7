pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod engine;
pub mod platform;
pub mod runtime;
pub mod state;
pub mod telegram;
