//! Command line front end for ESYBOT: `check`, `sim` and `run`.

pub mod config;
pub mod console;
pub mod telegram;
