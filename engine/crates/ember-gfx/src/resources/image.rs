use ash::vk;

/// 创建 Image 所需的全部信息，同时也是 pool 复用的 key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageDesc {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
}

// new & init
impl GfxImageDesc {
    #[inline]
    pub fn new(format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags) -> Self {
        Self { format, extent, usage }
    }
}

// getters
impl GfxImageDesc {
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        infer_aspect(self.format)
    }

    /// image 在整帧中常驻的 layout
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        image_layout_for_usage(self.usage)
    }
}

/// 从格式推断 aspect
pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// 根据 image 的全部用途选择一个常驻 layout
///
/// attachment 的 layout 转换交给 render pass 处理，
/// copy 时的 TRANSFER_SRC/DST 转换由 recorder 的 barriered copy 负责。
pub fn image_layout_for_usage(usage: vk::ImageUsageFlags) -> vk::ImageLayout {
    if usage.contains(vk::ImageUsageFlags::STORAGE) {
        vk::ImageLayout::GENERAL
    } else if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        if usage.contains(vk::ImageUsageFlags::SAMPLED) {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
    } else if usage.contains(vk::ImageUsageFlags::SAMPLED) {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else if usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::GENERAL
    }
}
