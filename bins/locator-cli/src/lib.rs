//! Client library for the locator CLI.

pub mod cli;
pub mod client;
pub mod error;
