#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod flat;
pub mod formats;
pub mod logging;
pub mod navigation;
pub mod toc;
