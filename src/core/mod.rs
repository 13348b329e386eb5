// src/core/mod.rs

pub mod html;
pub mod net;
pub mod proxy;
pub mod sanitize;
