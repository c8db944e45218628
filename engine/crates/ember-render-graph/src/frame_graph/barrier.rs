//! Barrier 计算
//!
//! 按 pass 顺序维护每个资源"上一次访问后还未同步的 stage"，
//! 资源再次被访问时，从这个 stage 到新的 stage 生成一个 barrier。

use std::collections::HashMap;

use ember_gfx::commands::barrier::{GFX_ALL_ATTACHMENT_OUT, GfxBufferBarrier, GfxImageBarrier};
use ember_gfx::resources::handles::GfxImageHandle;
use ember_gfx::vk;

use crate::frame_graph::frame_resources::{FgBarrier, FgFrameResources};
use crate::frame_graph::pass::FgPass;
use crate::frame_graph::resource_id::FgResourceId;
use crate::frame_graph::resource_info::FgImageCopy;

/// 一个 pass 需要的全部 barrier，一次性提交给 recorder
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FgPassBarriers {
    pub buffer_barriers: Vec<GfxBufferBarrier>,
    pub image_barriers: Vec<GfxImageBarrier>,
}

impl FgPassBarriers {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer_barriers.is_empty() && self.image_barriers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer_barriers.len() + self.image_barriers.len()
    }

    fn push(&mut self, barrier: FgBarrier) {
        match barrier {
            FgBarrier::Image(barrier) => self.image_barriers.push(barrier),
            FgBarrier::Buffer(barrier) => self.buffer_barriers.push(barrier),
        }
    }
}

#[derive(Default)]
pub struct FgBarrierBuilder {
    /// 资源 -> 上一次访问的 stage
    pending: HashMap<FgResourceId, vk::PipelineStageFlags2>,
}

impl FgBarrierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn pending_stage(&self, id: FgResourceId) -> Option<vk::PipelineStageFlags2> {
        self.pending.get(&id).copied()
    }

    /// 处理一次 image 拷贝
    ///
    /// 两个 image 已经 alias 时拷贝是空操作，只把 src 的同步状态转交给 dst；
    /// 否则返回需要执行的物理拷贝，两个资源的同步状态从头开始。
    pub fn copy_image(
        &mut self,
        copy: &FgImageCopy,
        resources: &FgFrameResources,
    ) -> Option<(GfxImageHandle, GfxImageHandle)> {
        let (src, dst) = (copy.src.id(), copy.dst.id());
        if resources.are_aliased(src, dst) {
            if let Some(stage) = self.pending.remove(&src) {
                self.pending.insert(dst, stage);
            }
            None
        } else {
            self.pending.remove(&src);
            self.pending.remove(&dst);
            Some((resources.image_base(copy.src), resources.image_base(copy.dst.into())))
        }
    }

    fn build_barriers(
        &mut self,
        usages: impl Iterator<Item = (FgResourceId, vk::PipelineStageFlags2)>,
        resources: &FgFrameResources,
        barriers: &mut FgPassBarriers,
    ) {
        for (id, stage) in usages {
            // attachment 的同步由 render pass 负责
            if (stage & !GFX_ALL_ATTACHMENT_OUT).is_empty() {
                self.pending.remove(&id);
                continue;
            }

            match self.pending.get_mut(&id) {
                Some(pending) => {
                    barriers.push(resources.barrier(id, *pending, stage));
                    *pending = stage;
                }
                None => {
                    self.pending.insert(id, stage);
                }
            }
        }
    }

    /// 计算 pass 开始前需要的 barrier，并更新同步状态
    pub fn build_pass_barriers<R>(&mut self, pass: &FgPass<'_, R>, resources: &FgFrameResources) -> FgPassBarriers {
        let mut barriers = FgPassBarriers::default();
        self.build_barriers(pass.buffers.iter().map(|(id, info)| (id.id(), info.stage)), resources, &mut barriers);
        self.build_barriers(pass.images.iter().map(|(id, info)| (id.id(), info.stage)), resources, &mut barriers);
        barriers
    }
}
