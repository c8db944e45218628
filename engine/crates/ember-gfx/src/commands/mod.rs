pub mod barrier;
pub mod command_log;
pub mod recorder;
