pub mod commands;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod identity;
pub mod logging;
pub mod network;
pub mod process;
pub mod session;
