use std::cell::RefCell;
use std::rc::Rc;

use ember_gfx::commands::recorder::GfxCommandRecorder;
use ember_gfx::vk;
use ember_render_interface::GfxTransientPool;
use itertools::Itertools;

use crate::frame_graph::alias_planner::{alias_root, plan_aliases};
use crate::frame_graph::executor::{FgCompiledGraph, FgFrameState};
use crate::frame_graph::frame_resources::FgFrameResources;
use crate::frame_graph::pass::{FgPass, FgPassBuilder};
use crate::frame_graph::resource_id::{FgBufferId, FgImageId, FgMutBufferId, FgMutImageId};
use crate::frame_graph::resource_info::{FgBufferCreateInfo, FgImageCreateInfo, FgResourceEntry, FgResourceRegistry};

/// 一帧的 frame graph
///
/// # 使用流程
///
/// 1. 创建: `FrameGraph::new(pool)`
/// 2. 声明虚拟资源: `declare_image` / `declare_buffer`
/// 3. 按执行顺序添加 pass: `add_pass(name)`，通过返回的 builder 声明资源用途和 render 回调
/// 4. 执行: `render(recorder)`，或者先 `compile()` 检查执行计划，再 `execute(recorder)`
///
/// pass 的执行顺序就是声明顺序，不会被重排或剔除。
///
/// # 生命周期
///
/// `'a` 是 render 回调可以借用的外部数据的生命周期，
/// `R` 是执行时使用的 command recorder。
pub struct FrameGraph<'a, R> {
    serial: u64,
    pool: Rc<RefCell<GfxTransientPool>>,

    pub(crate) registry: FgResourceRegistry,
    pub(crate) passes: Vec<FgPass<'a, R>>,
}

// new & init
impl<R> FrameGraph<'_, R> {
    pub fn new(pool: Rc<RefCell<GfxTransientPool>>) -> Self {
        let serial = pool.borrow_mut().next_frame_serial();
        log::debug!("FrameGraph #{}: {:?}", serial, FgFrameState::Declaring);
        Self { serial, pool, registry: FgResourceRegistry::new(serial), passes: Vec::new() }
    }
}

// declare
impl<'a, R> FrameGraph<'a, R> {
    pub fn declare_image(&mut self, format: vk::Format, size: vk::Extent2D) -> FgMutImageId {
        self.registry.declare_image(format, size)
    }

    pub fn declare_buffer(&mut self, byte_size: vk::DeviceSize) -> FgMutBufferId {
        self.registry.declare_buffer(byte_size)
    }

    /// 添加一个 pass，返回用于声明资源用途的 builder
    pub fn add_pass(&mut self, name: impl Into<String>) -> FgPassBuilder<'_, 'a, R> {
        let index = self.passes.len();
        self.passes.push(FgPass::new(name, index));
        FgPassBuilder { graph: self, index }
    }
}

// getters
impl<R> FrameGraph<'_, R> {
    /// 由 transient pool 签发的帧序号
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[inline]
    pub fn registry(&self) -> &FgResourceRegistry {
        &self.registry
    }

    #[inline]
    pub fn image_info(&self, image: impl Into<FgImageId>) -> &FgImageCreateInfo {
        self.registry.image(image.into())
    }

    #[inline]
    pub fn buffer_info(&self, buffer: impl Into<FgBufferId>) -> &FgBufferCreateInfo {
        self.registry.buffer(buffer.into())
    }

    #[inline]
    pub fn image_size(&self, image: impl Into<FgImageId>) -> vk::Extent2D {
        self.image_info(image).size()
    }

    #[inline]
    pub fn image_format(&self, image: impl Into<FgImageId>) -> vk::Format {
        self.image_info(image).format()
    }

    #[inline]
    pub fn is_attachment(&self, image: impl Into<FgImageId>) -> bool {
        self.image_info(image).is_attachment()
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn pass_name(&self, index: usize) -> &str {
        match self.passes.get(index) {
            Some(pass) => pass.name(),
            None => panic!("FrameGraph: Pass index out of bounds ({})", index),
        }
    }
}

// compile
impl<'a, R> FrameGraph<'a, R> {
    /// 规划 alias 并分配物理资源
    pub fn compile(self) -> FgCompiledGraph<'a, R> {
        ember_crate_tools::profile_scope!("FrameGraph::compile");

        let Self { serial, pool, mut registry, passes } = self;
        let mut state = FgFrameState::Declaring;

        state.transition(serial, FgFrameState::Planning);
        let pass_names = passes.iter().map(|pass| pass.name()).collect_vec();
        let plan = plan_aliases(&mut registry, &pass_names);

        let mut resources = FgFrameResources::new(pool);
        for &id in plan.allocation_order() {
            match registry.entry(id) {
                FgResourceEntry::Image(info) if info.alias().is_some() => {
                    let image = FgImageId(id);
                    resources.create_alias(image, alias_root(&registry, image));
                }
                FgResourceEntry::Image(info) => {
                    resources.create_image(FgImageId(id), info.format(), info.size(), info.usage());
                }
                FgResourceEntry::Buffer(info) => {
                    resources.create_buffer(FgBufferId(id), info.byte_size(), info.usage(), info.memory_type());
                }
            }
        }
        state.transition(serial, FgFrameState::Allocated);

        FgCompiledGraph { serial, registry, passes, plan, resources, state }
    }
}

impl<R: GfxCommandRecorder> FrameGraph<'_, R> {
    /// 编译并执行，frame graph 在此之后被消耗
    pub fn render(self, recorder: &mut R) {
        self.compile().execute(recorder);
    }
}
