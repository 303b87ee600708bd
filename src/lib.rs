pub mod agent;
pub mod archive;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod event;
pub mod installmodes;
pub mod logging;
pub mod utils;
