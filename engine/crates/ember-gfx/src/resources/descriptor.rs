use ash::vk;

use crate::resources::handles::{GfxBufferHandle, GfxImageHandle};

/// descriptor 指向的物理资源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxBoundResource {
    Image(GfxImageHandle),
    Buffer(GfxBufferHandle),
}

/// descriptor set 中的一个 binding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxDescriptorBinding {
    pub descriptor_type: vk::DescriptorType,
    pub resource: GfxBoundResource,
}

// new & init
impl GfxDescriptorBinding {
    #[inline]
    pub fn sampled_image(image: GfxImageHandle) -> Self {
        Self { descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER, resource: GfxBoundResource::Image(image) }
    }

    #[inline]
    pub fn storage_image(image: GfxImageHandle) -> Self {
        Self { descriptor_type: vk::DescriptorType::STORAGE_IMAGE, resource: GfxBoundResource::Image(image) }
    }

    #[inline]
    pub fn uniform_buffer(buffer: GfxBufferHandle) -> Self {
        Self { descriptor_type: vk::DescriptorType::UNIFORM_BUFFER, resource: GfxBoundResource::Buffer(buffer) }
    }

    #[inline]
    pub fn storage_buffer(buffer: GfxBufferHandle) -> Self {
        Self { descriptor_type: vk::DescriptorType::STORAGE_BUFFER, resource: GfxBoundResource::Buffer(buffer) }
    }
}

/// 已经解析为物理资源的 descriptor set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxDescriptorSetDesc {
    pub bindings: Vec<GfxDescriptorBinding>,
}
