//! 每帧的资源注册表
//!
//! 所有虚拟资源的元数据都保存在一个按下标访问的数组里，alias 和 copy 关系只保存 id，
//! 不持有引用。

use std::cmp::Ordering;

use ember_gfx::resources::memory::GfxMemoryType;
use ember_gfx::vk;

use crate::frame_graph::resource_id::{FgBufferId, FgImageId, FgMutBufferId, FgMutImageId, FgResourceId};

/// 资源在 pass 序列中的生命周期
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FgResourceCreateInfo {
    pub(crate) first_use: Option<usize>,
    pub(crate) last_read: Option<usize>,
    pub(crate) last_write: Option<usize>,
    /// 最后一次使用只是 transfer read，其他资源可以从同一个 pass 开始 alias 它
    pub(crate) can_alias_on_last: bool,
}

// getters
impl FgResourceCreateInfo {
    #[inline]
    pub fn first_use(&self) -> Option<usize> {
        self.first_use
    }

    #[inline]
    pub fn last_read(&self) -> Option<usize> {
        self.last_read
    }

    #[inline]
    pub fn last_write(&self) -> Option<usize> {
        self.last_write
    }

    /// `max(last_read, last_write)`
    #[inline]
    pub fn last_use(&self) -> Option<usize> {
        self.last_read.max(self.last_write)
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.first_use.is_some()
    }

    #[inline]
    pub fn can_alias_on_last(&self) -> bool {
        self.can_alias_on_last
    }
}

// update
impl FgResourceCreateInfo {
    /// 在第 `index` 个 pass 登记一次使用
    ///
    /// `can_alias_on_last` 只有在 last use 所在 pass 的全部使用都是 transfer read 时才成立
    pub(crate) fn register_use(&mut self, index: usize, is_written: bool, is_transfer_read: bool) {
        match self.last_use() {
            Some(last) if index < last => {}
            Some(last) if index == last => self.can_alias_on_last &= is_transfer_read,
            _ => self.can_alias_on_last = is_transfer_read,
        }

        let last = if is_written { &mut self.last_write } else { &mut self.last_read };
        *last = (*last).max(Some(index));
        self.first_use.get_or_insert(index);
    }
}

#[derive(Clone, Debug)]
pub struct FgImageCreateInfo {
    pub(crate) lifetime: FgResourceCreateInfo,
    pub(crate) format: vk::Format,
    pub(crate) size: vk::Extent2D,
    pub(crate) usage: vk::ImageUsageFlags,
    /// 复用这个 image 的物理内存
    pub(crate) alias: Option<FgImageId>,
    /// 初始内容需要从这个 image 拷贝
    pub(crate) copy_src: Option<FgImageId>,
}

// new & init
impl FgImageCreateInfo {
    fn new(format: vk::Format, size: vk::Extent2D) -> Self {
        Self {
            lifetime: FgResourceCreateInfo::default(),
            format,
            size,
            usage: vk::ImageUsageFlags::empty(),
            alias: None,
            copy_src: None,
        }
    }
}

// getters
impl FgImageCreateInfo {
    #[inline]
    pub fn lifetime(&self) -> &FgResourceCreateInfo {
        &self.lifetime
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn size(&self) -> vk::Extent2D {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn alias(&self) -> Option<FgImageId> {
        self.alias
    }

    #[inline]
    pub fn copy_src(&self) -> Option<FgImageId> {
        self.copy_src
    }

    /// transfer dst 不算真正的用途，只被拷贝写入的 image 依然需要 fallback usage
    #[inline]
    pub fn has_usage(&self) -> bool {
        !(self.usage & !vk::ImageUsageFlags::TRANSFER_DST).is_empty()
    }

    #[inline]
    pub fn is_aliased(&self) -> bool {
        self.alias.is_some() || self.copy_src.is_some()
    }

    #[inline]
    pub fn is_attachment(&self) -> bool {
        self.usage.intersects(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
    }
}

// update
impl FgImageCreateInfo {
    /// 吸收 `other` 的生命周期和用途，之后 `other` 直接使用自己的物理内存
    pub(crate) fn register_alias(&mut self, other: &FgImageCreateInfo) {
        assert!(
            other.size == self.size && other.format == self.format,
            "FrameGraph: cannot alias images of different geometry ({:?} {:?} vs {:?} {:?})",
            self.format,
            self.size,
            other.format,
            other.size
        );
        assert!(
            match (other.lifetime.first_use, self.lifetime.last_write) {
                (Some(first), Some(last_write)) => first > last_write,
                _ => true,
            },
            "FrameGraph: alias starts before the last write of its source"
        );

        // 合并后的最后一次使用来自谁，就沿用谁的 can_alias_on_last
        self.lifetime.can_alias_on_last = match self.lifetime.last_use().cmp(&other.lifetime.last_use()) {
            Ordering::Less => other.lifetime.can_alias_on_last,
            Ordering::Equal => self.lifetime.can_alias_on_last && other.lifetime.can_alias_on_last,
            Ordering::Greater => self.lifetime.can_alias_on_last,
        };
        self.lifetime.last_write = self.lifetime.last_write.max(other.lifetime.last_write);
        self.lifetime.last_read = self.lifetime.last_read.max(other.lifetime.last_read);
        self.usage |= other.usage;
    }
}

#[derive(Clone, Debug)]
pub struct FgBufferCreateInfo {
    pub(crate) lifetime: FgResourceCreateInfo,
    pub(crate) byte_size: vk::DeviceSize,
    pub(crate) usage: vk::BufferUsageFlags,
    pub(crate) memory_type: GfxMemoryType,
}

impl FgBufferCreateInfo {
    #[inline]
    pub fn lifetime(&self) -> &FgResourceCreateInfo {
        &self.lifetime
    }

    #[inline]
    pub fn byte_size(&self) -> vk::DeviceSize {
        self.byte_size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory_type(&self) -> GfxMemoryType {
        self.memory_type
    }
}

#[derive(Clone, Debug)]
pub(crate) enum FgResourceEntry {
    Image(FgImageCreateInfo),
    Buffer(FgBufferCreateInfo),
}

impl FgResourceEntry {
    pub(crate) fn lifetime(&self) -> &FgResourceCreateInfo {
        match self {
            Self::Image(info) => &info.lifetime,
            Self::Buffer(info) => &info.lifetime,
        }
    }
}

/// 一次 image 拷贝：在 `pass_index` 开始之前，把 `src` 的内容复制到 `dst`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FgImageCopy {
    pub pass_index: usize,
    pub dst: FgMutImageId,
    pub src: FgImageId,
}

fn check_image_usage_io(usage: vk::ImageUsageFlags, is_output: bool) {
    if usage == vk::ImageUsageFlags::SAMPLED || usage == vk::ImageUsageFlags::TRANSFER_SRC {
        assert!(!is_output, "FrameGraph: image usage {:?} must be declared as an input", usage);
    } else if usage == vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        || usage == vk::ImageUsageFlags::COLOR_ATTACHMENT
        || usage == vk::ImageUsageFlags::TRANSFER_DST
    {
        assert!(is_output, "FrameGraph: image usage {:?} must be declared as an output", usage);
    }
}

fn check_buffer_usage_io(usage: vk::BufferUsageFlags, is_output: bool) {
    const INPUT_ONLY: [vk::BufferUsageFlags; 5] = [
        vk::BufferUsageFlags::VERTEX_BUFFER,
        vk::BufferUsageFlags::INDEX_BUFFER,
        vk::BufferUsageFlags::INDIRECT_BUFFER,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        vk::BufferUsageFlags::TRANSFER_SRC,
    ];
    if INPUT_ONLY.contains(&usage) {
        assert!(!is_output, "FrameGraph: buffer usage {:?} must be declared as an input", usage);
    } else if usage == vk::BufferUsageFlags::TRANSFER_DST {
        assert!(is_output, "FrameGraph: buffer usage {:?} must be declared as an output", usage);
    }
}

/// 一帧内所有虚拟资源的元数据
pub struct FgResourceRegistry {
    graph: u64,
    entries: Vec<FgResourceEntry>,
    pub(crate) image_copies: Vec<FgImageCopy>,
}

// new & init
impl FgResourceRegistry {
    pub fn new(graph: u64) -> Self {
        Self { graph, entries: Vec::new(), image_copies: Vec::new() }
    }
}

// register
impl FgResourceRegistry {
    fn next_id(&self) -> FgResourceId {
        FgResourceId { index: self.entries.len() as u32, graph: self.graph }
    }

    pub fn declare_image(&mut self, format: vk::Format, size: vk::Extent2D) -> FgMutImageId {
        let id = self.next_id();
        self.entries.push(FgResourceEntry::Image(FgImageCreateInfo::new(format, size)));
        FgMutImageId(id)
    }

    pub fn declare_buffer(&mut self, byte_size: vk::DeviceSize) -> FgMutBufferId {
        let id = self.next_id();
        self.entries.push(FgResourceEntry::Buffer(FgBufferCreateInfo {
            lifetime: FgResourceCreateInfo::default(),
            byte_size,
            usage: vk::BufferUsageFlags::empty(),
            memory_type: GfxMemoryType::default(),
        }));
        FgMutBufferId(id)
    }

    pub(crate) fn register_image_usage(
        &mut self,
        image: FgImageId,
        usage: vk::ImageUsageFlags,
        is_written: bool,
        pass_index: usize,
    ) {
        check_image_usage_io(usage, is_written);
        let info = self.image_mut(image);
        info.usage |= usage;
        // 拷贝在 pass 之前执行，所以只作为拷贝源的 image 在同一个 pass 就可以被 alias
        info.lifetime.register_use(pass_index, is_written, usage == vk::ImageUsageFlags::TRANSFER_SRC);
    }

    pub(crate) fn register_buffer_usage(
        &mut self,
        buffer: FgBufferId,
        usage: vk::BufferUsageFlags,
        is_written: bool,
        pass_index: usize,
    ) {
        check_buffer_usage_io(usage, is_written);
        let info = self.buffer_mut(buffer);
        info.usage |= usage;
        info.lifetime.register_use(pass_index, is_written, false);
    }

    pub(crate) fn register_image_copy(&mut self, dst: FgMutImageId, src: FgImageId, pass_index: usize) {
        assert_ne!(dst.id(), src.id(), "FrameGraph: an image cannot be a copy of itself");
        self.image(src);

        let info = self.image_mut(dst.into());
        if info.copy_src.is_some() {
            panic!("FrameGraph: Resource is already a copy ({:?})", dst.id());
        }
        info.copy_src = Some(src);
        self.image_copies.push(FgImageCopy { pass_index, dst, src });
    }

    pub(crate) fn set_cpu_visible(&mut self, buffer: FgMutBufferId, pass_index: usize) {
        let info = self.buffer_mut(buffer.into());
        info.memory_type = GfxMemoryType::CpuVisible;
        info.lifetime.register_use(pass_index, true, false);
    }
}

// getters
impl FgResourceRegistry {
    #[inline]
    pub fn graph(&self) -> u64 {
        self.graph
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn image_copies(&self) -> &[FgImageCopy] {
        &self.image_copies
    }

    fn check_exists(&self, id: FgResourceId) -> usize {
        if id.graph != self.graph || id.index() >= self.entries.len() {
            panic!("FrameGraph: Resource doesn't exist ({:?})", id);
        }
        id.index()
    }

    pub(crate) fn entry(&self, id: FgResourceId) -> &FgResourceEntry {
        &self.entries[self.check_exists(id)]
    }

    pub fn image(&self, image: FgImageId) -> &FgImageCreateInfo {
        match self.entry(image.id()) {
            FgResourceEntry::Image(info) => info,
            FgResourceEntry::Buffer(_) => panic!("FrameGraph: Resource doesn't exist ({:?} is a buffer)", image.id()),
        }
    }

    pub(crate) fn image_mut(&mut self, image: FgImageId) -> &mut FgImageCreateInfo {
        let index = self.check_exists(image.id());
        match &mut self.entries[index] {
            FgResourceEntry::Image(info) => info,
            FgResourceEntry::Buffer(_) => panic!("FrameGraph: Resource doesn't exist ({:?} is a buffer)", image.id()),
        }
    }

    pub fn buffer(&self, buffer: FgBufferId) -> &FgBufferCreateInfo {
        match self.entry(buffer.id()) {
            FgResourceEntry::Buffer(info) => info,
            FgResourceEntry::Image(_) => panic!("FrameGraph: Resource doesn't exist ({:?} is an image)", buffer.id()),
        }
    }

    pub(crate) fn buffer_mut(&mut self, buffer: FgBufferId) -> &mut FgBufferCreateInfo {
        let index = self.check_exists(buffer.id());
        match &mut self.entries[index] {
            FgResourceEntry::Buffer(info) => info,
            FgResourceEntry::Image(_) => panic!("FrameGraph: Resource doesn't exist ({:?} is an image)", buffer.id()),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (FgResourceId, &FgResourceEntry)> {
        let graph = self.graph;
        self.entries
            .iter()
            .enumerate()
            .map(move |(index, entry)| (FgResourceId { index: index as u32, graph }, entry))
    }

    pub fn iter_images(&self) -> impl Iterator<Item = (FgImageId, &FgImageCreateInfo)> {
        self.iter().filter_map(|(id, entry)| match entry {
            FgResourceEntry::Image(info) => Some((FgImageId(id), info)),
            FgResourceEntry::Buffer(_) => None,
        })
    }

    pub fn iter_buffers(&self) -> impl Iterator<Item = (FgBufferId, &FgBufferCreateInfo)> {
        self.iter().filter_map(|(id, entry)| match entry {
            FgResourceEntry::Buffer(info) => Some((FgBufferId(id), info)),
            FgResourceEntry::Image(_) => None,
        })
    }
}
