//! Port traits decoupling the domain from data sources and configuration.

pub mod bar_port;
pub mod config_port;
pub mod directory_port;
