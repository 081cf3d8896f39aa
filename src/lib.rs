#![forbid(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod fallback;
pub mod generator;
pub mod ids;
pub mod logging;
pub mod model;
pub mod parser;
pub mod reconcile;
pub mod regenerate;
pub mod store;
pub mod validate;
