// src/lib.rs

#[macro_use]
pub mod macros;
#[macro_use]
pub mod log;

pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod model;
pub mod source;

pub mod csv;
pub mod file;
pub mod persist;
pub mod store;

pub mod delta;
pub mod feed;
pub mod reset;
pub mod scheduler;
pub mod vip;

pub mod cli;
pub mod export;

pub use error::{Error, Result};
