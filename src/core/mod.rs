// src/core/mod.rs — Reasoning engine

pub mod chain;
pub mod controller;
pub mod fanout;
pub mod prompts;
pub mod ranking;
pub mod schema;
pub mod thought;
pub mod token_budget;
pub mod trajectory;
pub mod types;
