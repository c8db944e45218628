use ash::vk;

use crate::resources::handles::GfxImageHandle;

/// 一个 pass 的 attachment 集合
///
/// attachment 的 layout 转换和同步由 render pass 自己处理，
/// 所以 frame graph 不会为它们插入 barrier。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxFramebuffer {
    pub extent: vk::Extent2D,
    /// 按声明顺序排列
    pub color_attachments: Vec<GfxImageHandle>,
    pub depth_attachment: Option<GfxImageHandle>,
}

impl GfxFramebuffer {
    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + usize::from(self.depth_attachment.is_some())
    }
}
