//! Pass 定义和构建器
//!
//! `FgPassBuilder` 在声明阶段把 pass 的资源用途写入注册表，
//! `FgPass` 保存这些用途供 barrier 计算使用，以及只会被调用一次的 render 回调。

use std::ops::BitOrAssign;

use ember_gfx::resources::descriptor::{GfxBoundResource, GfxDescriptorBinding, GfxDescriptorSetDesc};
use ember_gfx::resources::framebuffer::GfxFramebuffer;
use ember_gfx::resources::handles::{GfxBufferHandle, GfxImageHandle};
use ember_gfx::vk;
use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::frame_graph::frame_resources::FgFrameResources;
use crate::frame_graph::graph::FrameGraph;
use crate::frame_graph::resource_id::{
    FgBufferId, FgImageId, FgMutBufferId, FgMutImageId, FgMutResource, FgResource, FgResourceId,
};

/// pass 对一个资源的用途，以及访问它的 pipeline stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FgUsageInfo<U> {
    pub usage: U,
    pub stage: vk::PipelineStageFlags2,
}

/// pass 的 render 回调，执行时被 move 走，只能调用一次
pub type FgRenderFunc<'a, R> = Box<dyn FnOnce(&mut R, &FgPassContext<'_>) + 'a>;

/// descriptor set 中的一个 binding，在执行前解析为物理资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FgDescriptorBinding {
    Image { image: FgImageId, descriptor_type: vk::DescriptorType },
    Buffer { buffer: FgBufferId, descriptor_type: vk::DescriptorType },
    /// 不属于 frame graph 的资源
    External(GfxDescriptorBinding),
}

/// 一个已声明的 pass
pub struct FgPass<'a, R> {
    pub(crate) name: String,
    pub(crate) index: usize,

    /// 按声明顺序，同一个资源的多次声明会被合并
    pub(crate) images: IndexMap<FgImageId, FgUsageInfo<vk::ImageUsageFlags>>,
    pub(crate) buffers: IndexMap<FgBufferId, FgUsageInfo<vk::BufferUsageFlags>>,

    pub(crate) descriptor_sets: Vec<Vec<FgDescriptorBinding>>,

    pub(crate) colors: Vec<FgMutImageId>,
    pub(crate) depth: Option<FgMutImageId>,

    pub(crate) render_func: Option<FgRenderFunc<'a, R>>,
}

// new & init
impl<R> FgPass<'_, R> {
    pub(crate) fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            images: IndexMap::new(),
            buffers: IndexMap::new(),
            descriptor_sets: Vec::new(),
            colors: Vec::new(),
            depth: None,
            render_func: None,
        }
    }
}

// getters
impl<R> FgPass<'_, R> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn images(&self) -> &IndexMap<FgImageId, FgUsageInfo<vk::ImageUsageFlags>> {
        &self.images
    }

    #[inline]
    pub fn buffers(&self) -> &IndexMap<FgBufferId, FgUsageInfo<vk::BufferUsageFlags>> {
        &self.buffers
    }

    #[inline]
    pub fn has_render_func(&self) -> bool {
        self.render_func.is_some()
    }

    /// 所有声明的 attachment，color 在前，depth 在后
    pub fn attachments(&self) -> impl Iterator<Item = FgMutImageId> + '_ {
        self.colors.iter().copied().chain(self.depth)
    }
}

// execute
impl<R> FgPass<'_, R> {
    /// 根据 color 和 depth output 创建 framebuffer，没有 attachment 时返回 None
    pub(crate) fn init_framebuffer(&self, resources: &FgFrameResources) -> Option<GfxFramebuffer> {
        let first = self.attachments().next()?;
        let extent = resources.image_desc(first.into()).extent;

        Some(GfxFramebuffer {
            extent,
            color_attachments: self.colors.iter().map(|color| resources.image_base((*color).into())).collect(),
            depth_attachment: self.depth.map(|depth| resources.image_base(depth.into())),
        })
    }

    pub(crate) fn init_descriptor_sets(&self, resources: &FgFrameResources) -> Vec<GfxDescriptorSetDesc> {
        self.descriptor_sets
            .iter()
            .map(|set| GfxDescriptorSetDesc {
                bindings: set
                    .iter()
                    .map(|binding| match *binding {
                        FgDescriptorBinding::Image { image, descriptor_type } => GfxDescriptorBinding {
                            descriptor_type,
                            resource: GfxBoundResource::Image(resources.image_base(image)),
                        },
                        FgDescriptorBinding::Buffer { buffer, descriptor_type } => GfxDescriptorBinding {
                            descriptor_type,
                            resource: GfxBoundResource::Buffer(resources.buffer_base(buffer)),
                        },
                        FgDescriptorBinding::External(binding) => binding,
                    })
                    .collect(),
            })
            .collect()
    }
}

fn merge_usage<K: std::hash::Hash + Eq, U: BitOrAssign + Copy>(
    table: &mut IndexMap<K, FgUsageInfo<U>>,
    key: K,
    usage: U,
    stage: vk::PipelineStageFlags2,
) {
    match table.entry(key) {
        Entry::Occupied(mut entry) => {
            let info = entry.get_mut();
            info.usage |= usage;
            info.stage |= stage;
        }
        Entry::Vacant(entry) => {
            entry.insert(FgUsageInfo { usage, stage });
        }
    }
}

/// Pass 构建器
///
/// 由 `FrameGraph::add_pass` 创建，声明 pass 读写的资源。
/// 所有声明都只是簿记，在 frame graph 执行之前不会产生任何命令。
pub struct FgPassBuilder<'g, 'a, R> {
    pub(crate) graph: &'g mut FrameGraph<'a, R>,
    pub(crate) index: usize,
}

// helpers
impl<'a, R> FgPassBuilder<'_, 'a, R> {
    #[inline]
    fn pass(&mut self) -> &mut FgPass<'a, R> {
        &mut self.graph.passes[self.index]
    }

    fn add_image(
        &mut self,
        image: FgImageId,
        usage: vk::ImageUsageFlags,
        is_written: bool,
        stage: vk::PipelineStageFlags2,
    ) {
        self.graph.registry.register_image_usage(image, usage, is_written, self.index);
        merge_usage(&mut self.pass().images, image, usage, stage);
    }

    fn add_buffer(
        &mut self,
        buffer: FgBufferId,
        usage: vk::BufferUsageFlags,
        is_written: bool,
        stage: vk::PipelineStageFlags2,
    ) {
        self.graph.registry.register_buffer_usage(buffer, usage, is_written, self.index);
        merge_usage(&mut self.pass().buffers, buffer, usage, stage);
    }

    fn add_binding(&mut self, binding: FgDescriptorBinding, ds_index: usize) {
        let sets = &mut self.pass().descriptor_sets;
        if sets.len() <= ds_index {
            sets.resize_with(ds_index + 1, Vec::new);
        }
        sets[ds_index].push(binding);
    }

    /// 同一个 pass 的 attachment 必须大小一致
    fn check_attachment_size(&self, image: FgMutImageId) {
        let pass = &self.graph.passes[self.index];
        let size = self.graph.registry.image(image.into()).size();
        if let Some(first) = pass.attachments().next() {
            let expected = self.graph.registry.image(first.into()).size();
            assert!(
                size == expected,
                "FrameGraph: framebuffer attachments of pass \"{}\" have different sizes ({:?} vs {:?})",
                pass.name,
                expected,
                size
            );
        }
    }
}

// declare
impl<'a, R> FgPassBuilder<'_, 'a, R> {
    #[inline]
    pub fn pass_index(&self) -> usize {
        self.index
    }

    pub fn add_texture_input(&mut self, image: impl Into<FgImageId>, stage: vk::PipelineStageFlags2) {
        self.add_image(image.into(), vk::ImageUsageFlags::SAMPLED, false, stage);
    }

    pub fn add_depth_output(&mut self, image: FgMutImageId) {
        if self.graph.passes[self.index].depth.is_some() {
            panic!("FrameGraph: Pass \"{}\" already has a depth output", self.graph.passes[self.index].name);
        }
        self.check_attachment_size(image);
        self.add_image(
            image.into(),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            true,
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
        );
        self.pass().depth = Some(image);
    }

    pub fn add_color_output(&mut self, image: FgMutImageId) {
        self.check_attachment_size(image);
        self.add_image(
            image.into(),
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            true,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        );
        self.pass().colors.push(image);
    }

    /// pass 自己在 render 回调里从这个 image 拷贝数据
    pub fn add_copy_src(&mut self, image: impl Into<FgImageId>) {
        self.add_image(image.into(), vk::ImageUsageFlags::TRANSFER_SRC, false, vk::PipelineStageFlags2::TRANSFER);
    }

    pub fn add_storage_output(
        &mut self,
        resource: impl Into<FgMutResource>,
        ds_index: usize,
        stage: vk::PipelineStageFlags2,
    ) {
        match resource.into() {
            FgMutResource::Image(image) => {
                self.add_image(image.into(), vk::ImageUsageFlags::STORAGE, true, stage);
                self.add_binding(
                    FgDescriptorBinding::Image {
                        image: image.into(),
                        descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
                    },
                    ds_index,
                );
            }
            FgMutResource::Buffer(buffer) => {
                self.add_buffer(buffer.into(), vk::BufferUsageFlags::STORAGE_BUFFER, true, stage);
                self.add_binding(
                    FgDescriptorBinding::Buffer {
                        buffer: buffer.into(),
                        descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                    },
                    ds_index,
                );
            }
        }
    }

    pub fn add_storage_input(
        &mut self,
        resource: impl Into<FgResource>,
        ds_index: usize,
        stage: vk::PipelineStageFlags2,
    ) {
        match resource.into() {
            FgResource::Image(image) => {
                self.add_image(image, vk::ImageUsageFlags::STORAGE, false, stage);
                self.add_binding(
                    FgDescriptorBinding::Image { image, descriptor_type: vk::DescriptorType::STORAGE_IMAGE },
                    ds_index,
                );
            }
            FgResource::Buffer(buffer) => {
                self.add_buffer(buffer, vk::BufferUsageFlags::STORAGE_BUFFER, false, stage);
                self.add_binding(
                    FgDescriptorBinding::Buffer { buffer, descriptor_type: vk::DescriptorType::STORAGE_BUFFER },
                    ds_index,
                );
            }
        }
    }

    /// buffer 作为 uniform buffer 绑定，image 作为 sampled image 绑定
    pub fn add_uniform_input(
        &mut self,
        resource: impl Into<FgResource>,
        ds_index: usize,
        stage: vk::PipelineStageFlags2,
    ) {
        match resource.into() {
            FgResource::Image(image) => {
                self.add_image(image, vk::ImageUsageFlags::SAMPLED, false, stage);
                self.add_binding(
                    FgDescriptorBinding::Image { image, descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER },
                    ds_index,
                );
            }
            FgResource::Buffer(buffer) => {
                self.add_buffer(buffer, vk::BufferUsageFlags::UNIFORM_BUFFER, false, stage);
                self.add_binding(
                    FgDescriptorBinding::Buffer { buffer, descriptor_type: vk::DescriptorType::UNIFORM_BUFFER },
                    ds_index,
                );
            }
        }
    }

    pub fn add_attrib_input(&mut self, buffer: impl Into<FgBufferId>, stage: vk::PipelineStageFlags2) {
        self.add_buffer(buffer.into(), vk::BufferUsageFlags::VERTEX_BUFFER, false, stage);
    }

    pub fn add_index_input(&mut self, buffer: impl Into<FgBufferId>, stage: vk::PipelineStageFlags2) {
        self.add_buffer(buffer.into(), vk::BufferUsageFlags::INDEX_BUFFER, false, stage);
    }

    /// 绑定一个不属于 frame graph 的资源
    pub fn add_descriptor_binding(&mut self, binding: GfxDescriptorBinding, ds_index: usize) {
        self.add_binding(FgDescriptorBinding::External(binding), ds_index);
    }

    /// CPU 会在本帧 map 并写入这个 buffer
    pub fn map_update(&mut self, buffer: FgMutBufferId) {
        self.graph.registry.set_cpu_visible(buffer, self.index);
    }

    /// 声明一个和 `src` 格式、大小相同的新 image，内容在本 pass 开始前从 `src` 拷贝
    pub fn declare_copy(&mut self, src: impl Into<FgImageId>) -> FgMutImageId {
        let src = src.into();
        let (format, size) = {
            let info = self.graph.registry.image(src);
            (info.format(), info.size())
        };
        let dst = self.graph.registry.declare_image(format, size);
        self.add_image_copy(dst, src);
        dst
    }

    /// `dst` 的内容在本 pass 开始前从 `src` 拷贝
    ///
    /// 拷贝的同步由执行阶段单独处理，这里只登记生命周期，不写入 pass 的用途表
    pub fn add_image_copy(&mut self, dst: FgMutImageId, src: impl Into<FgImageId>) {
        let src = src.into();
        self.graph.registry.register_image_copy(dst, src, self.index);
        self.graph.registry.register_image_usage(src, vk::ImageUsageFlags::TRANSFER_SRC, false, self.index);
        self.graph.registry.register_image_usage(dst.into(), vk::ImageUsageFlags::TRANSFER_DST, true, self.index);
    }

    pub fn set_render_func(&mut self, func: impl FnOnce(&mut R, &FgPassContext<'_>) + 'a) {
        let pass = self.pass();
        if pass.render_func.is_some() {
            panic!("FrameGraph: Pass \"{}\" already has a render function", pass.name);
        }
        pass.render_func = Some(Box::new(func));
    }
}

/// Pass 执行时的上下文
///
/// 提供虚拟资源到物理资源的查询，以及已经初始化好的 framebuffer 和 descriptor sets。
pub struct FgPassContext<'r> {
    pub(crate) name: &'r str,
    pub(crate) index: usize,
    pub(crate) resources: &'r FgFrameResources,
    pub(crate) framebuffer: Option<&'r GfxFramebuffer>,
    pub(crate) descriptor_sets: &'r [GfxDescriptorSetDesc],
}

impl FgPassContext<'_> {
    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn framebuffer(&self) -> Option<&GfxFramebuffer> {
        self.framebuffer
    }

    #[inline]
    pub fn descriptor_sets(&self) -> &[GfxDescriptorSetDesc] {
        self.descriptor_sets
    }

    #[inline]
    pub fn resources(&self) -> &FgFrameResources {
        self.resources
    }

    /// 获取图像的物理句柄
    #[inline]
    pub fn image(&self, image: impl Into<FgImageId>) -> GfxImageHandle {
        self.resources.image_base(image.into())
    }

    /// 获取缓冲区的物理句柄
    #[inline]
    pub fn buffer(&self, buffer: impl Into<FgBufferId>) -> GfxBufferHandle {
        self.resources.buffer_base(buffer.into())
    }

    #[inline]
    pub fn is_aliased(&self, a: impl Into<FgResourceId>, b: impl Into<FgResourceId>) -> bool {
        self.resources.are_aliased(a.into(), b.into())
    }
}
