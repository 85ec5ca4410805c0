#![forbid(unsafe_code)]

pub mod access;
pub mod checkpoint;
pub mod clean;
pub mod cli;
pub mod collect;
pub mod config;
pub mod export;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod parse;
pub mod run;
