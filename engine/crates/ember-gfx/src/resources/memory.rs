use ash::vk;

/// Buffer 所在的内存类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GfxMemoryType {
    /// 只有 GPU 可以访问，默认选项
    #[default]
    DeviceLocal,
    /// CPU 可以 map 写入
    CpuVisible,
}

impl GfxMemoryType {
    /// 对应的 vulkan memory property
    pub fn memory_property_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            Self::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            Self::CpuVisible => vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        }
    }
}

/// 创建 Buffer 所需的全部信息，同时也是 pool 复用的 key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxBufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub memory_type: GfxMemoryType,
}

impl GfxBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags, memory_type: GfxMemoryType) -> Self {
        Self { size, usage, memory_type }
    }
}
