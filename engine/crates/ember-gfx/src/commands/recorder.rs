use std::any::Any;

use glam::Vec4;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::resources::framebuffer::GfxFramebuffer;
use crate::resources::handles::GfxImageHandle;

/// frame graph 向 command buffer 录制命令时使用的接口
///
/// 真正的 vulkan command buffer 和测试用的 [`GfxCommandLog`](super::command_log::GfxCommandLog) 都实现它
pub trait GfxCommandRecorder {
    /// 开始一个 debug label 区域，必须和 [`Self::end_region`] 成对出现
    fn begin_region(&mut self, name: &str, color: Vec4);

    fn end_region(&mut self);

    fn bind_framebuffer(&mut self, framebuffer: &GfxFramebuffer);

    /// 一次性提交一组 pipeline barrier
    fn barriers(&mut self, buffer_barriers: &[GfxBufferBarrier], image_barriers: &[GfxImageBarrier]);

    /// 带前后同步的 image copy，recorder 负责 layout 转换
    fn barriered_copy(&mut self, src: GfxImageHandle, dst: GfxImageHandle);

    /// 保持对象存活，直到 command buffer 执行完毕
    fn keep_alive(&mut self, object: Box<dyn Any>);
}
