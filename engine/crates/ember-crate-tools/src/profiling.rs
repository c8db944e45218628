//! CPU profiling
//!
//! 开启 `profiling` feature 后，[`profile_scope!`](crate::profile_scope) 会生成 tracy span；
//! 否则展开为空，不产生任何开销。

#[cfg(feature = "profiling")]
pub use tracy_client;

/// 为当前作用域创建一个 profiling span，作用域结束时自动关闭
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::tracy_client::span!($name);
    };
}

/// 为当前作用域创建一个 profiling span（未开启 profiling，空实现）
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}
