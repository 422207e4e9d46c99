pub mod args;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod engine;
pub mod merge;
pub mod months;
pub mod reconcile;
pub mod terminal;
