//! Launch config parsing, substitution and plan resolution

mod launch_config;
mod plan;
mod substitution;

pub use launch_config::*;
pub use plan::*;
pub use substitution::*;
