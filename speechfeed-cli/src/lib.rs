//! speechfeed CLI: run the batch loader and feature extraction from the shell.

pub mod batches;
pub mod cli;
pub mod config;
pub mod features;
