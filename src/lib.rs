pub mod config;
pub mod consts;
pub mod monitor;
pub mod settings;
pub mod systemd;
pub mod utils;
