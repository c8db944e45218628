use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ember_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier, access_mask_for_stage};
use ember_gfx::resources::handles::{GfxBufferHandle, GfxImageHandle};
use ember_gfx::resources::image::GfxImageDesc;
use ember_gfx::resources::memory::{GfxBufferDesc, GfxMemoryType};
use ember_gfx::vk;
use ember_render_interface::GfxTransientPool;

use crate::frame_graph::resource_id::{FgBufferId, FgImageId, FgResourceId};

/// 一个资源的 barrier，由 [`FgFrameResources::barrier`] 根据资源类型生成
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FgBarrier {
    Image(GfxImageBarrier),
    Buffer(GfxBufferBarrier),
}

/// 一帧的物理资源
///
/// 保存虚拟资源到物理句柄的映射。alias 只记录它的根资源，不会占用新的物理资源。
/// 析构时把所有物理资源归还给 pool，所以它需要交给 recorder 的 keep alive，
/// 等 GPU 执行完毕后再释放。
pub struct FgFrameResources {
    pool: Rc<RefCell<GfxTransientPool>>,

    images: HashMap<FgResourceId, (GfxImageHandle, GfxImageDesc)>,
    buffers: HashMap<FgResourceId, (GfxBufferHandle, GfxBufferDesc)>,

    /// alias -> 根资源
    aliases: HashMap<FgResourceId, FgResourceId>,
}

// new & init
impl FgFrameResources {
    pub fn new(pool: Rc<RefCell<GfxTransientPool>>) -> Self {
        Self { pool, images: HashMap::new(), buffers: HashMap::new(), aliases: HashMap::new() }
    }
}

// create
impl FgFrameResources {
    pub fn create_image(&mut self, id: FgImageId, format: vk::Format, size: vk::Extent2D, usage: vk::ImageUsageFlags) {
        let desc = GfxImageDesc::new(format, size, usage);
        assert!(!self.is_realized(id.id()), "FrameGraph: image {:?} realized twice", id.id());

        let handle = self.pool.borrow_mut().acquire_image(desc);
        log::debug!("FrameGraph: image {:?} -> {:?} ({:?} {}x{})", id.id(), handle, format, size.width, size.height);
        self.images.insert(id.id(), (handle, desc));
    }

    pub fn create_buffer(
        &mut self,
        id: FgBufferId,
        byte_size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_type: GfxMemoryType,
    ) {
        let desc = GfxBufferDesc::new(byte_size, usage, memory_type);
        assert!(!self.is_realized(id.id()), "FrameGraph: buffer {:?} realized twice", id.id());

        let handle = self.pool.borrow_mut().acquire_buffer(desc);
        log::debug!("FrameGraph: buffer {:?} -> {:?} ({} bytes, {:?})", id.id(), handle, byte_size, memory_type);
        self.buffers.insert(id.id(), (handle, desc));
    }

    /// `id` 直接使用 `root` 的物理资源
    pub fn create_alias(&mut self, id: FgImageId, root: FgImageId) {
        assert!(!self.is_realized(id.id()), "FrameGraph: image {:?} realized twice", id.id());

        let root = self.root_of(root.id());
        assert_ne!(root, id.id(), "FrameGraph: image {:?} cannot alias itself", id.id());
        log::debug!("FrameGraph: image {:?} aliases {:?}", id.id(), root);
        self.aliases.insert(id.id(), root);
    }
}

// getters
impl FgFrameResources {
    fn is_realized(&self, id: FgResourceId) -> bool {
        self.images.contains_key(&id) || self.buffers.contains_key(&id) || self.aliases.contains_key(&id)
    }

    #[inline]
    fn root_of(&self, id: FgResourceId) -> FgResourceId {
        self.aliases.get(&id).copied().unwrap_or(id)
    }

    fn image_entry(&self, id: FgImageId) -> &(GfxImageHandle, GfxImageDesc) {
        self.images
            .get(&self.root_of(id.id()))
            .unwrap_or_else(|| panic!("FrameGraph: Resource doesn't exist ({:?})", id.id()))
    }

    fn buffer_entry(&self, id: FgBufferId) -> &(GfxBufferHandle, GfxBufferDesc) {
        self.buffers.get(&id.id()).unwrap_or_else(|| panic!("FrameGraph: Resource doesn't exist ({:?})", id.id()))
    }

    /// image 的物理句柄，alias 返回根资源的句柄
    #[inline]
    pub fn image_base(&self, id: FgImageId) -> GfxImageHandle {
        self.image_entry(id).0
    }

    #[inline]
    pub fn image_desc(&self, id: FgImageId) -> &GfxImageDesc {
        &self.image_entry(id).1
    }

    #[inline]
    pub fn buffer_base(&self, id: FgBufferId) -> GfxBufferHandle {
        self.buffer_entry(id).0
    }

    #[inline]
    pub fn buffer_desc(&self, id: FgBufferId) -> &GfxBufferDesc {
        &self.buffer_entry(id).1
    }

    /// 两个资源是否共享同一份物理内存
    pub fn are_aliased(&self, a: FgResourceId, b: FgResourceId) -> bool {
        self.root_of(a) == self.root_of(b)
    }

    /// 实际占用物理资源的 image 数量
    #[inline]
    pub fn physical_image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn physical_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// 从 `src_stage` 到 `dst_stage` 的 barrier
    ///
    /// frame graph 内的 image 在整帧中保持同一个 layout，所以 image barrier 不做 layout 转换
    pub fn barrier(
        &self,
        id: FgResourceId,
        src_stage: vk::PipelineStageFlags2,
        dst_stage: vk::PipelineStageFlags2,
    ) -> FgBarrier {
        let root = self.root_of(id);
        if let Some((handle, desc)) = self.images.get(&root) {
            let layout = desc.layout();
            FgBarrier::Image(
                GfxImageBarrier::new()
                    .image(*handle)
                    .layout_transfer(layout, layout)
                    .src_mask(src_stage, access_mask_for_stage(src_stage))
                    .dst_mask(dst_stage, access_mask_for_stage(dst_stage))
                    .image_aspect_flag(desc.aspect()),
            )
        } else if let Some((handle, _)) = self.buffers.get(&root) {
            FgBarrier::Buffer(
                GfxBufferBarrier::new()
                    .buffer(*handle, 0, vk::WHOLE_SIZE)
                    .src_mask(src_stage, access_mask_for_stage(src_stage))
                    .dst_mask(dst_stage, access_mask_for_stage(dst_stage)),
            )
        } else {
            panic!("FrameGraph: Resource doesn't exist ({:?})", id)
        }
    }
}

impl Drop for FgFrameResources {
    fn drop(&mut self) {
        let mut pool = self.pool.borrow_mut();
        for (handle, _) in self.images.values() {
            pool.release_image(*handle);
        }
        for (handle, _) in self.buffers.values() {
            pool.release_buffer(*handle);
        }
        log::debug!(
            "FrameGraph: released {} images and {} buffers to the transient pool",
            self.images.len(),
            self.buffers.len()
        );
    }
}
