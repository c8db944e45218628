//! Ember 的 GFX 层边界
//!
//! frame graph 不直接和驱动打交道，它只产出 barrier 描述，
//! 并通过 [`GfxCommandRecorder`](commands::recorder::GfxCommandRecorder) 把命令交给真正的后端。

pub use ash::vk;

pub mod basic;
pub mod commands;
pub mod resources;
