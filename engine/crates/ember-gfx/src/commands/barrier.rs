use ash::vk;

use crate::resources::handles::{GfxBufferHandle, GfxImageHandle};

/// 只和 attachment 写入相关的 stage
///
/// 这些 stage 的同步由 render pass 的 subpass dependency 负责，不需要额外的 barrier
pub const GFX_ALL_ATTACHMENT_OUT: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT.as_raw()
        | vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

/// 根据 stage 推断一个保守的 access mask
///
/// frame graph 只记录 stage，不区分读写，所以这里同时给出读和写
pub fn access_mask_for_stage(stage: vk::PipelineStageFlags2) -> vk::AccessFlags2 {
    if stage.is_empty() {
        return vk::AccessFlags2::NONE;
    }

    let mut access = vk::AccessFlags2::empty();
    if stage.intersects(vk::PipelineStageFlags2::TRANSFER | vk::PipelineStageFlags2::ALL_TRANSFER) {
        access |= vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE;
    }
    if stage.intersects(vk::PipelineStageFlags2::HOST) {
        access |= vk::AccessFlags2::HOST_READ | vk::AccessFlags2::HOST_WRITE;
    }
    if stage.intersects(vk::PipelineStageFlags2::VERTEX_INPUT) {
        access |= vk::AccessFlags2::VERTEX_ATTRIBUTE_READ | vk::AccessFlags2::INDEX_READ;
    }
    if stage.intersects(vk::PipelineStageFlags2::DRAW_INDIRECT) {
        access |= vk::AccessFlags2::INDIRECT_COMMAND_READ;
    }
    if stage.intersects(GFX_ALL_ATTACHMENT_OUT) {
        access |= vk::AccessFlags2::COLOR_ATTACHMENT_WRITE | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }

    let shader_stages = stage & !(vk::PipelineStageFlags2::TRANSFER
        | vk::PipelineStageFlags2::ALL_TRANSFER
        | vk::PipelineStageFlags2::HOST
        | vk::PipelineStageFlags2::VERTEX_INPUT
        | vk::PipelineStageFlags2::DRAW_INDIRECT
        | GFX_ALL_ATTACHMENT_OUT);
    if !shader_stages.is_empty() {
        access |= vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_WRITE;
    }

    access
}

/// 便捷描述 image memory barrier 的结构体
///
/// 只引用 transient pool 中的句柄，由 recorder 负责翻译成真正的 vulkan barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageBarrier {
    pub image: GfxImageHandle,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub aspect: vk::ImageAspectFlags,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            image: GfxImageHandle::default(),
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: GfxImageHandle) -> Self {
        self.image = image;
        self
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.old_layout = old_layout;
        self.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage: vk::PipelineStageFlags2, src_access: vk::AccessFlags2) -> Self {
        self.src_stage = src_stage;
        self.src_access = src_access;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage: vk::PipelineStageFlags2, dst_access: vk::AccessFlags2) -> Self {
        self.dst_stage = dst_stage;
        self.dst_access = dst_access;
        self
    }

    /// builder
    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBufferBarrier {
    pub buffer: GfxBufferHandle,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl Default for GfxBufferBarrier {
    fn default() -> Self {
        Self {
            buffer: GfxBufferHandle::default(),
            offset: 0,
            size: vk::WHOLE_SIZE,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
        }
    }
}

impl GfxBufferBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn buffer(mut self, buffer: GfxBufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        self.buffer = buffer;
        self.offset = offset;
        self.size = size;
        self
    }

    #[inline]
    pub fn src_mask(mut self, src_stage: vk::PipelineStageFlags2, src_access: vk::AccessFlags2) -> Self {
        self.src_stage = src_stage;
        self.src_access = src_access;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, dst_stage: vk::PipelineStageFlags2, dst_access: vk::AccessFlags2) -> Self {
        self.dst_stage = dst_stage;
        self.dst_access = dst_access;
        self
    }
}
