//! Marathon wire records

mod app;
mod deployment;
mod task;

pub use app::*;
pub use deployment::*;
pub use task::*;
