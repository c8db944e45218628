//! 编译结果和执行器
//!
//! `FgCompiledGraph` 持有已经规划好的 alias 和物理资源，
//! `execute` 按声明顺序执行 pass，并在每个 pass 之前插入拷贝和 barrier。

use ember_gfx::basic::color::{LabelColor, identifying_color};
use ember_gfx::commands::recorder::GfxCommandRecorder;
use ember_gfx::vk;
use itertools::Itertools;

use crate::frame_graph::alias_planner::FgAliasPlan;
use crate::frame_graph::barrier::FgBarrierBuilder;
use crate::frame_graph::frame_resources::FgFrameResources;
use crate::frame_graph::pass::{FgPass, FgPassContext};
use crate::frame_graph::resource_info::FgResourceRegistry;

/// 一帧的状态机
///
/// `Declaring -> Planning -> Allocated -> Executing(0..N) -> Retired`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FgFrameState {
    Declaring,
    Planning,
    Allocated,
    Executing { pass: usize },
    Retired,
}

impl FgFrameState {
    pub fn can_transition_to(self, next: FgFrameState) -> bool {
        match (self, next) {
            (Self::Declaring, Self::Planning) | (Self::Planning, Self::Allocated) => true,
            (Self::Allocated, Self::Executing { pass }) => pass == 0,
            (Self::Executing { pass }, Self::Executing { pass: next }) => next == pass + 1,
            (Self::Allocated | Self::Executing { .. }, Self::Retired) => true,
            _ => false,
        }
    }

    pub(crate) fn transition(&mut self, serial: u64, next: FgFrameState) {
        assert!(
            self.can_transition_to(next),
            "FrameGraph #{}: illegal state transition {:?} -> {:?}",
            serial,
            self,
            next
        );
        log::debug!("FrameGraph #{}: {:?} -> {:?}", serial, self, next);
        *self = next;
    }
}

/// 编译完成的 frame graph
pub struct FgCompiledGraph<'a, R> {
    pub(crate) serial: u64,
    pub(crate) registry: FgResourceRegistry,
    pub(crate) passes: Vec<FgPass<'a, R>>,
    pub(crate) plan: FgAliasPlan,
    pub(crate) resources: FgFrameResources,
    pub(crate) state: FgFrameState,
}

// getters
impl<R> FgCompiledGraph<'_, R> {
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[inline]
    pub fn state(&self) -> FgFrameState {
        self.state
    }

    #[inline]
    pub fn plan(&self) -> &FgAliasPlan {
        &self.plan
    }

    #[inline]
    pub fn registry(&self) -> &FgResourceRegistry {
        &self.registry
    }

    #[inline]
    pub fn resources(&self) -> &FgFrameResources {
        &self.resources
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn pass_name(&self, index: usize) -> &str {
        &self.passes[index].name
    }
}

// execute
impl<R: GfxCommandRecorder> FgCompiledGraph<'_, R> {
    /// 按声明顺序执行所有 pass
    ///
    /// 每个 pass：执行属于它的拷贝，初始化 framebuffer 和 descriptor set，
    /// 一次性提交 barrier，最后调用 render 回调。
    /// 结束后注册表和物理资源交给 recorder 的 keep alive，直到 GPU 执行完毕才归还给 pool。
    pub fn execute(self, recorder: &mut R) {
        ember_crate_tools::profile_scope!("FrameGraph::execute");

        let Self { serial, registry, passes, plan, resources, mut state } = self;

        recorder.begin_region("Framegraph render", LabelColor::COLOR_PASS);

        let mut barrier_builder = FgBarrierBuilder::new();
        let mut copies = plan.copies.iter().peekable();
        for mut pass in passes {
            state.transition(serial, FgFrameState::Executing { pass: pass.index });
            recorder.begin_region(&pass.name, identifying_color(pass.index));

            while let Some(copy) = copies.next_if(|copy| copy.pass_index == pass.index) {
                if let Some((src, dst)) = barrier_builder.copy_image(copy, &resources) {
                    recorder.barriered_copy(src, dst);
                }
            }

            let framebuffer = pass.init_framebuffer(&resources);
            let descriptor_sets = pass.init_descriptor_sets(&resources);

            let barriers = barrier_builder.build_pass_barriers(&pass, &resources);
            if !barriers.is_empty() {
                recorder.barriers(&barriers.buffer_barriers, &barriers.image_barriers);
            }

            match pass.render_func.take() {
                Some(render) => {
                    let ctx = FgPassContext {
                        name: &pass.name,
                        index: pass.index,
                        resources: &resources,
                        framebuffer: framebuffer.as_ref(),
                        descriptor_sets: &descriptor_sets,
                    };
                    render(recorder, &ctx);
                }
                None => log::debug!("FrameGraph #{}: pass \"{}\" has no render function", serial, pass.name),
            }

            recorder.end_region();
        }

        recorder.end_region();

        recorder.keep_alive(Box::new((registry, resources)));
        state.transition(serial, FgFrameState::Retired);
    }
}

// 调试方法
impl<R> FgCompiledGraph<'_, R> {
    /// 打印执行计划（用于调试）
    ///
    /// 包括每个 pass 的资源用途、拷贝是否被折叠，以及执行时会插入的 barrier
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              FrameGraph #{} Execution Plan", self.serial);
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Passes: {}  |  Resources: {}  |  Physical: {} images, {} buffers  |  Folded copies: {}",
            self.passes.len(),
            self.registry.len(),
            self.resources.physical_image_count(),
            self.resources.physical_buffer_count(),
            self.plan.folded.len()
        );
        log::info!("║ Order: [{}]", self.passes.iter().map(|pass| pass.name.as_str()).join(" → "));
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        let mut barrier_builder = FgBarrierBuilder::new();
        let mut copies = self.plan.copies.iter().peekable();
        for pass in &self.passes {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ [{}/{}] Pass: \"{}\"", pass.index + 1, self.passes.len(), pass.name);
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            while let Some(copy) = copies.next_if(|copy| copy.pass_index == pass.index) {
                match barrier_builder.copy_image(copy, &self.resources) {
                    Some(_) => log::info!("│ Copy {:?} -> {:?}", copy.src.id(), copy.dst.id()),
                    None => log::info!("│ Copy {:?} -> {:?} (aliased, no-op)", copy.src.id(), copy.dst.id()),
                }
            }
            for (image, info) in &pass.images {
                log::info!("│ Image {:?}: {:?} @ {}", image.id(), info.usage, format_pipeline_stage(info.stage));
            }
            for (buffer, info) in &pass.buffers {
                log::info!("│ Buffer {:?}: {:?} @ {}", buffer.id(), info.usage, format_pipeline_stage(info.stage));
            }

            let barriers = barrier_builder.build_pass_barriers(pass, &self.resources);
            log::info!("├─────────────────────────────────────────────────────────────────┤");
            if barriers.is_empty() {
                log::info!("│ No barriers required");
            }
            for barrier in &barriers.buffer_barriers {
                log::info!(
                    "│   Buffer {:?}: {} → {}",
                    barrier.buffer,
                    format_pipeline_stage(barrier.src_stage),
                    format_pipeline_stage(barrier.dst_stage)
                );
            }
            for barrier in &barriers.image_barriers {
                log::info!(
                    "│   Image {:?}: {} → {} ({:?})",
                    barrier.image,
                    format_pipeline_stage(barrier.src_stage),
                    format_pipeline_stage(barrier.dst_stage),
                    barrier.new_layout
                );
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }
}

/// 格式化 PipelineStageFlags2 为可读字符串
fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    const NAMES: [(vk::PipelineStageFlags2, &str); 14] = [
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::HOST, "HOST"),
        (vk::PipelineStageFlags2::ALL_GRAPHICS, "ALL_GRAPHICS"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];

    let names = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", stage) } else { names.join(" | ") }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use ember_gfx::commands::command_log::{GfxCommand, GfxCommandLog};
    use ember_gfx::resources::descriptor::GfxDescriptorBinding;
    use ember_gfx::resources::handles::GfxImageHandle;
    use ember_render_interface::GfxTransientPool;

    use super::*;
    use crate::frame_graph::graph::FrameGraph;

    const FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    const EXTENT: vk::Extent2D = vk::Extent2D { width: 64, height: 64 };

    fn new_pool() -> Rc<RefCell<GfxTransientPool>> {
        ember_crate_tools::init_test_log();
        Rc::new(RefCell::new(GfxTransientPool::new()))
    }

    fn user_position(log: &GfxCommandLog, label: &str) -> Option<usize> {
        log.commands().iter().position(|cmd| matches!(cmd, GfxCommand::User(l) if l == label))
    }

    #[test]
    fn copy_after_last_use_becomes_alias() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let a = graph.declare_image(FORMAT, EXTENT);
        graph.add_pass("p0").add_color_output(a);
        graph.add_pass("p1").add_texture_input(a, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        let b = {
            let mut pass = graph.add_pass("p2");
            let b = pass.declare_copy(a);
            pass.set_render_func(move |cmd: &mut GfxCommandLog, ctx| {
                assert_eq!(ctx.index(), 2);
                assert!(ctx.is_aliased(a, b));
                cmd.record("p2");
            });
            b
        };

        let compiled = graph.compile();
        assert_eq!(compiled.state(), FgFrameState::Allocated);
        assert_eq!(compiled.pass_count(), 3);
        assert_eq!(compiled.pass_name(2), "p2");
        assert_eq!(compiled.plan().folded_copies().len(), 1);
        assert!(compiled.resources().are_aliased(a.id(), b.id()));
        assert_eq!(compiled.resources().physical_image_count(), 1);
        assert_eq!(compiled.registry().image(b.into()).alias(), Some(a.into()));

        let mut log = GfxCommandLog::new();
        compiled.execute(&mut log);
        assert_eq!(log.copies().count(), 0);
        assert!(user_position(&log, "p2").is_some());
    }

    #[test]
    fn overlapping_copy_runs_before_the_pass() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let a = graph.declare_image(FORMAT, EXTENT);
        graph.add_pass("p0").add_color_output(a);
        let b = {
            let mut pass = graph.add_pass("p1");
            let b = pass.declare_copy(a);
            pass.add_texture_input(b, vk::PipelineStageFlags2::FRAGMENT_SHADER);
            pass.set_render_func(|cmd: &mut GfxCommandLog, _| cmd.record("p1"));
            b
        };
        graph.add_pass("p2").add_texture_input(a, vk::PipelineStageFlags2::FRAGMENT_SHADER);

        let compiled = graph.compile();
        assert!(compiled.plan().folded_copies().is_empty());
        assert!(!compiled.resources().are_aliased(a.id(), b.id()));
        let expected = (compiled.resources().image_base(a.into()), compiled.resources().image_base(b.into()));

        let mut log = GfxCommandLog::new();
        compiled.execute(&mut log);

        assert_eq!(log.copies().collect::<Vec<_>>(), vec![expected]);
        let copy_position = log.commands().iter().position(|cmd| matches!(cmd, GfxCommand::BarrieredCopy { .. }));
        assert!(log.region_position("p1") < copy_position);
        assert!(copy_position < user_position(&log, "p1"));
    }

    #[test]
    fn unused_resources_still_get_allocated() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let unused_image = graph.declare_image(FORMAT, EXTENT);
        let unused_buffer = graph.declare_buffer(512);
        let used = graph.declare_image(FORMAT, EXTENT);
        graph.add_pass("p0").add_color_output(used);

        let compiled = graph.compile();
        assert_eq!(compiled.registry().image(unused_image.into()).usage(), vk::ImageUsageFlags::SAMPLED);
        assert_eq!(compiled.registry().buffer(unused_buffer.into()).usage(), vk::BufferUsageFlags::STORAGE_BUFFER);
        assert_eq!(compiled.resources().image_desc(unused_image.into()).usage, vk::ImageUsageFlags::SAMPLED);
        compiled.resources().buffer_base(unused_buffer.into());

        compiled.execute(&mut GfxCommandLog::new());
    }

    #[test]
    fn same_stage_writes_get_one_barrier() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let buffer = graph.declare_buffer(1024);
        graph.add_pass("p0").add_storage_output(buffer, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
        {
            let mut pass = graph.add_pass("p1");
            pass.add_storage_output(buffer, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
            pass.add_storage_output(buffer, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
        }

        let mut log = GfxCommandLog::new();
        graph.render(&mut log);

        let batches = log.barrier_batches().collect::<Vec<_>>();
        assert_eq!(batches.len(), 1);
        let (buffers, images) = batches[0];
        assert_eq!(buffers.len(), 1);
        assert!(images.is_empty());
        assert_eq!(buffers[0].src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(buffers[0].dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);

        let barrier_position = log.commands().iter().position(|cmd| matches!(cmd, GfxCommand::Barriers { .. }));
        assert!(log.region_position("p1") < barrier_position);
    }

    #[test]
    fn attachment_stages_need_no_barrier() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let color = graph.declare_image(FORMAT, EXTENT);
        graph.add_pass("p0").add_color_output(color);
        graph.add_pass("p1").add_color_output(color);
        graph.add_pass("p2").add_texture_input(color, vk::PipelineStageFlags2::FRAGMENT_SHADER);

        let mut log = GfxCommandLog::new();
        graph.render(&mut log);
        assert_eq!(log.barrier_batches().count(), 0);
    }

    #[test]
    fn shader_reads_after_compute_write_are_synchronized() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let image = graph.declare_image(FORMAT, EXTENT);
        graph.add_pass("compute").add_storage_output(image, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
        graph.add_pass("shade").add_texture_input(image, vk::PipelineStageFlags2::FRAGMENT_SHADER);

        let mut log = GfxCommandLog::new();
        graph.render(&mut log);

        let batches = log.barrier_batches().collect::<Vec<_>>();
        assert_eq!(batches.len(), 1);
        let (_, images) = batches[0];
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(images[0].dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(images[0].new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn passes_run_once_in_declaration_order() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let color = graph.declare_image(FORMAT, EXTENT);
        let depth = graph.declare_image(vk::Format::D32_SFLOAT, EXTENT);
        let calls = Rc::new(Cell::new(0));

        for name in ["shadow", "gbuffer", "post"] {
            let calls = calls.clone();
            let mut pass = graph.add_pass(name);
            if name == "gbuffer" {
                pass.add_color_output(color);
                pass.add_depth_output(depth);
            }
            pass.set_render_func(move |cmd: &mut GfxCommandLog, ctx| {
                calls.set(calls.get() + 1);
                if let Some(framebuffer) = ctx.framebuffer() {
                    cmd.bind_framebuffer(framebuffer);
                }
                cmd.record(ctx.name());
            });
        }

        let mut log = GfxCommandLog::new();
        graph.render(&mut log);

        assert_eq!(calls.get(), 3);
        let order = log
            .commands()
            .iter()
            .filter_map(|cmd| match cmd {
                GfxCommand::User(label) => Some(label.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["shadow", "gbuffer", "post"]);

        let framebuffers = log
            .commands()
            .iter()
            .filter_map(|cmd| match cmd {
                GfxCommand::BindFramebuffer(framebuffer) => Some(framebuffer),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(framebuffers.len(), 1);
        assert_eq!(framebuffers[0].extent, EXTENT);
        assert_eq!(framebuffers[0].color_attachments.len(), 1);
        assert_eq!(framebuffers[0].attachment_count(), 2);
        assert!(framebuffers[0].depth_attachment.is_some());
    }

    #[test]
    fn regions_wrap_every_pass() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        graph.add_pass("first");
        graph.add_pass("second");

        let mut log = GfxCommandLog::new();
        graph.render(&mut log);

        assert_eq!(log.region_depth(), 0);
        assert_eq!(log.region_position("Framegraph render"), Some(0));
        match &log.commands()[3] {
            GfxCommand::BeginRegion { name, color } => {
                assert_eq!(name, "second");
                assert_eq!(*color, identifying_color(1));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn descriptor_sets_resolve_to_physical_handles() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let uniforms = graph.declare_buffer(256);
        let output = graph.declare_image(vk::Format::R8G8B8A8_UNORM, EXTENT);
        let external = GfxDescriptorBinding::sampled_image(GfxImageHandle::default());
        let checked = Rc::new(Cell::new(false));
        {
            let checked = checked.clone();
            let mut pass = graph.add_pass("lighting");
            pass.map_update(uniforms);
            pass.add_uniform_input(uniforms, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
            pass.add_storage_output(output, 1, vk::PipelineStageFlags2::COMPUTE_SHADER);
            pass.add_descriptor_binding(external, 0);
            pass.set_render_func(move |_: &mut GfxCommandLog, ctx| {
                let sets = ctx.descriptor_sets();
                assert_eq!(sets.len(), 2);
                let uniform_binding = GfxDescriptorBinding::uniform_buffer(ctx.buffer(uniforms));
                assert_eq!(sets[0].bindings, vec![uniform_binding, external]);
                assert_eq!(sets[1].bindings, vec![GfxDescriptorBinding::storage_image(ctx.image(output))]);
                checked.set(true);
            });
        }

        graph.render(&mut GfxCommandLog::new());
        assert!(checked.get());
    }

    #[test]
    fn retired_frame_returns_resources_to_the_pool() {
        let pool = new_pool();
        let declare = |graph: &mut FrameGraph<'static, GfxCommandLog>| {
            let image = graph.declare_image(FORMAT, EXTENT);
            graph.add_pass("p0").add_color_output(image);
            graph.add_pass("p1").add_texture_input(image, vk::PipelineStageFlags2::FRAGMENT_SHADER);
            image
        };

        let mut first = FrameGraph::new(pool.clone());
        let first_serial = first.serial();
        let image = declare(&mut first);
        let compiled = first.compile();
        let handle = compiled.resources().image_base(image.into());

        let mut log = GfxCommandLog::new();
        compiled.execute(&mut log);
        assert_eq!(log.kept_alive_count(), 1);
        assert_eq!(pool.borrow().idle_image_count(), 0);

        log.retire();
        assert_eq!(pool.borrow().idle_image_count(), 1);

        let mut second = FrameGraph::new(pool.clone());
        assert!(second.serial() > first_serial);
        let image = declare(&mut second);
        let compiled = second.compile();
        assert_eq!(compiled.resources().image_base(image.into()), handle);
        assert_eq!(pool.borrow().image_count(), 1);
    }

    #[test]
    fn state_machine_only_moves_forward() {
        assert!(FgFrameState::Declaring.can_transition_to(FgFrameState::Planning));
        assert!(!FgFrameState::Declaring.can_transition_to(FgFrameState::Allocated));
        assert!(FgFrameState::Allocated.can_transition_to(FgFrameState::Executing { pass: 0 }));
        assert!(!FgFrameState::Executing { pass: 0 }.can_transition_to(FgFrameState::Executing { pass: 2 }));
        assert!(FgFrameState::Executing { pass: 3 }.can_transition_to(FgFrameState::Retired));
        assert!(!FgFrameState::Retired.can_transition_to(FgFrameState::Declaring));
    }

    #[test]
    fn printing_the_plan_does_not_change_execution() {
        let pool = new_pool();
        let mut graph = FrameGraph::<GfxCommandLog>::new(pool);
        let a = graph.declare_image(FORMAT, EXTENT);
        graph.add_pass("p0").add_storage_output(a, 0, vk::PipelineStageFlags2::COMPUTE_SHADER);
        graph.add_pass("p1").add_texture_input(a, vk::PipelineStageFlags2::FRAGMENT_SHADER);

        let compiled = graph.compile();
        compiled.print_execution_plan();

        let mut log = GfxCommandLog::new();
        compiled.execute(&mut log);
        assert_eq!(log.barrier_batches().count(), 1);
    }
}
