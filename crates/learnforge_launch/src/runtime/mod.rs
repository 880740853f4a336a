//! Runtime components for process supervision

pub mod command;
pub mod detector;
pub mod process;
pub mod supervisor;

pub use command::*;
pub use detector::*;
pub use process::*;
pub use supervisor::*;
