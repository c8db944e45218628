use std::any::Any;

use glam::Vec4;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::recorder::GfxCommandRecorder;
use crate::resources::framebuffer::GfxFramebuffer;
use crate::resources::handles::GfxImageHandle;

/// 被录制下来的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum GfxCommand {
    BeginRegion { name: String, color: Vec4 },
    EndRegion,
    BindFramebuffer(GfxFramebuffer),
    Barriers { buffers: Vec<GfxBufferBarrier>, images: Vec<GfxImageBarrier> },
    BarrieredCopy { src: GfxImageHandle, dst: GfxImageHandle },
    /// pass 自己录制的命令，例如 draw call
    User(String),
}

/// 不依赖 GPU 的 recorder，只记录命令序列
///
/// keep alive 的对象会一直持有，直到调用 [`GfxCommandLog::retire`]，
/// 相当于 command buffer 在 GPU 上执行完成。
#[derive(Default)]
pub struct GfxCommandLog {
    commands: Vec<GfxCommand>,
    kept_alive: Vec<Box<dyn Any>>,
    region_depth: usize,
}

// new & init
impl GfxCommandLog {
    pub fn new() -> Self {
        Self::default()
    }
}

// getters
impl GfxCommandLog {
    #[inline]
    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }

    #[inline]
    pub fn kept_alive_count(&self) -> usize {
        self.kept_alive.len()
    }

    /// 尚未关闭的 region 数量
    #[inline]
    pub fn region_depth(&self) -> usize {
        self.region_depth
    }

    /// 所有 `Barriers` 命令
    pub fn barrier_batches(&self) -> impl Iterator<Item = (&[GfxBufferBarrier], &[GfxImageBarrier])> {
        self.commands.iter().filter_map(|cmd| match cmd {
            GfxCommand::Barriers { buffers, images } => Some((buffers.as_slice(), images.as_slice())),
            _ => None,
        })
    }

    /// 所有 barriered copy，按录制顺序
    pub fn copies(&self) -> impl Iterator<Item = (GfxImageHandle, GfxImageHandle)> + '_ {
        self.commands.iter().filter_map(|cmd| match cmd {
            GfxCommand::BarrieredCopy { src, dst } => Some((*src, *dst)),
            _ => None,
        })
    }

    /// 第一个名字为 `name` 的 region 的位置
    pub fn region_position(&self, name: &str) -> Option<usize> {
        self.commands.iter().position(|cmd| matches!(cmd, GfxCommand::BeginRegion { name: n, .. } if n == name))
    }
}

// tools
impl GfxCommandLog {
    /// 记录一条用户命令
    pub fn record(&mut self, label: impl Into<String>) {
        self.commands.push(GfxCommand::User(label.into()));
    }

    /// 模拟 command buffer 执行完毕，释放所有 keep alive 的对象
    pub fn retire(&mut self) {
        log::debug!("GfxCommandLog: retire {} kept-alive objects", self.kept_alive.len());
        self.kept_alive.clear();
    }
}

impl GfxCommandRecorder for GfxCommandLog {
    fn begin_region(&mut self, name: &str, color: Vec4) {
        self.region_depth += 1;
        self.commands.push(GfxCommand::BeginRegion { name: name.to_string(), color });
    }

    fn end_region(&mut self) {
        assert!(self.region_depth > 0, "GfxCommandLog: end_region without matching begin_region");
        self.region_depth -= 1;
        self.commands.push(GfxCommand::EndRegion);
    }

    fn bind_framebuffer(&mut self, framebuffer: &GfxFramebuffer) {
        self.commands.push(GfxCommand::BindFramebuffer(framebuffer.clone()));
    }

    fn barriers(&mut self, buffer_barriers: &[GfxBufferBarrier], image_barriers: &[GfxImageBarrier]) {
        self.commands
            .push(GfxCommand::Barriers { buffers: buffer_barriers.to_vec(), images: image_barriers.to_vec() });
    }

    fn barriered_copy(&mut self, src: GfxImageHandle, dst: GfxImageHandle) {
        self.commands.push(GfxCommand::BarrieredCopy { src, dst });
    }

    fn keep_alive(&mut self, object: Box<dyn Any>) {
        self.kept_alive.push(object);
    }
}
