// src/lib.rs — Library root for thinkchain

pub mod cli;
pub mod core;
pub mod infra;
pub mod provider;
pub mod util;
