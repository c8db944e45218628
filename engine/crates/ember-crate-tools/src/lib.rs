//! 在各个 crates 之间共享的工具：日志初始化与 profiling 宏

pub mod init_log;
pub mod profiling;

pub use init_log::{init_log, init_log_with_filter, init_test_log};
