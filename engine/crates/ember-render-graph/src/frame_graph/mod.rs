//! FrameGraph - 单帧的渲染调度
//!
//! pass 在虚拟资源上声明读写，frame graph 据此计算 alias、分配物理资源，
//! 并在执行时按声明顺序插入拷贝和最少的 barrier。
//!
//! # 核心概念
//!
//! - **FgImageId / FgBufferId**: 只读的虚拟资源 id，`FgMut*` 为可写版本
//! - **FgPassBuilder**: 声明 pass 的资源用途、descriptor 绑定和 render 回调
//! - **FgAliasPlan**: 生命周期不重叠的拷贝被折叠成 alias，不需要真正执行
//! - **FgFrameResources**: 虚拟资源到物理句柄的映射，析构时归还给 transient pool
//! - **FgCompiledGraph**: 编译结果，可以打印执行计划，然后执行
//!
//! # 使用示例
//!
//! ```ignore
//! let mut graph = FrameGraph::new(pool.clone());
//! let gbuffer = graph.declare_image(vk::Format::R16G16B16A16_SFLOAT, extent);
//! let lit = graph.declare_image(vk::Format::R16G16B16A16_SFLOAT, extent);
//!
//! {
//!     let mut pass = graph.add_pass("gbuffer");
//!     pass.add_color_output(gbuffer);
//!     pass.set_render_func(|cmd, ctx| {
//!         cmd.bind_framebuffer(ctx.framebuffer().unwrap());
//!         // draw...
//!     });
//! }
//! {
//!     let mut pass = graph.add_pass("lighting");
//!     pass.add_uniform_input(gbuffer, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
//!     pass.add_storage_output(lit, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
//!     pass.set_render_func(|cmd, ctx| {
//!         // dispatch...
//!     });
//! }
//!
//! graph.render(&mut cmd);
//! ```

mod alias_planner;
mod barrier;
mod executor;
mod frame_resources;
mod graph;
mod pass;
mod resource_id;
mod resource_info;

pub use alias_planner::{FgAliasPlan, plan_aliases};
pub use barrier::{FgBarrierBuilder, FgPassBarriers};
pub use executor::{FgCompiledGraph, FgFrameState};
pub use frame_resources::{FgBarrier, FgFrameResources};
pub use graph::FrameGraph;
pub use pass::{FgDescriptorBinding, FgPass, FgPassBuilder, FgPassContext, FgRenderFunc, FgUsageInfo};
pub use resource_id::{FgBufferId, FgImageId, FgMutBufferId, FgMutImageId, FgMutResource, FgResource, FgResourceId};
pub use resource_info::{
    FgBufferCreateInfo, FgImageCopy, FgImageCreateInfo, FgResourceCreateInfo, FgResourceRegistry,
};
