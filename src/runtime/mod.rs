//! Process model: supervisor, workers, signals and drain.

pub mod drain;
pub mod signals;
pub mod supervisor;
pub mod worker;
