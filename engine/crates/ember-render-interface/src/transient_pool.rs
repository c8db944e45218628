use std::collections::HashMap;
use std::hash::Hash;

use ember_gfx::resources::handles::{GfxBufferHandle, GfxImageHandle};
use ember_gfx::resources::image::GfxImageDesc;
use ember_gfx::resources::memory::GfxBufferDesc;
use slotmap::{Key, SlotMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GfxTransientState {
    /// 被某一帧的 frame resources 持有
    InUse { serial: u64 },
    /// 已归还，等待被相同描述的请求复用
    Idle { since: u64 },
}

#[derive(Debug)]
pub struct GfxTransientEntry<D> {
    desc: D,
    state: GfxTransientState,
}

impl<D> GfxTransientEntry<D> {
    #[inline]
    pub fn desc(&self) -> &D {
        &self.desc
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        matches!(self.state, GfxTransientState::InUse { .. })
    }
}

/// 同一类资源的存储：slotmap 加上按描述索引的空闲列表
struct GfxTransientSlots<K: Key, D> {
    entries: SlotMap<K, GfxTransientEntry<D>>,
    free: HashMap<D, Vec<K>>,
}

impl<K: Key, D: Copy + Eq + Hash + std::fmt::Debug> GfxTransientSlots<K, D> {
    fn new() -> Self {
        Self { entries: SlotMap::with_key(), free: HashMap::new() }
    }

    /// 返回句柄，以及是否复用了已有的资源
    fn acquire(&mut self, desc: D, serial: u64) -> (K, bool) {
        if let Some(handle) = self.free.get_mut(&desc).and_then(Vec::pop) {
            let entry = &mut self.entries[handle];
            entry.state = GfxTransientState::InUse { serial };
            return (handle, true);
        }

        let handle = self.entries.insert(GfxTransientEntry { desc, state: GfxTransientState::InUse { serial } });
        (handle, false)
    }

    fn release(&mut self, handle: K, serial: u64) {
        let Some(entry) = self.entries.get_mut(handle) else {
            panic!("GfxTransientPool: release of unknown handle {:?}", handle);
        };
        assert!(entry.in_use(), "GfxTransientPool: handle {:?} released twice", handle);

        entry.state = GfxTransientState::Idle { since: serial };
        self.free.entry(entry.desc).or_default().push(handle);
    }

    /// 删除空闲超过 `max_idle_frames` 的资源，返回删除的数量
    fn collect(&mut self, serial: u64, max_idle_frames: u64) -> usize {
        let entries = &mut self.entries;
        let mut removed = 0;
        self.free.retain(|_, handles| {
            handles.retain(|handle| {
                let expired = match entries[*handle].state {
                    GfxTransientState::Idle { since } => serial.saturating_sub(since) > max_idle_frames,
                    GfxTransientState::InUse { .. } => false,
                };
                if expired {
                    entries.remove(*handle);
                    removed += 1;
                }
                !expired
            });
            !handles.is_empty()
        });
        removed
    }

    fn idle_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}

/// frame graph 使用的跨帧资源池
///
/// 每一帧的 frame graph 从这里获取序号和物理资源句柄，
/// frame resources 析构时把句柄归还，之后相同描述的请求会直接复用。
///
/// 只在单线程中使用，多个 frame graph 通过 `Rc<RefCell<GfxTransientPool>>` 共享。
pub struct GfxTransientPool {
    images: GfxTransientSlots<GfxImageHandle, GfxImageDesc>,
    buffers: GfxTransientSlots<GfxBufferHandle, GfxBufferDesc>,

    /// 当前帧序号，同时作为 frame graph 的 id
    frame_serial: u64,
}

impl Default for GfxTransientPool {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl GfxTransientPool {
    pub fn new() -> Self {
        Self { images: GfxTransientSlots::new(), buffers: GfxTransientSlots::new(), frame_serial: 0 }
    }
}

// update
impl GfxTransientPool {
    /// 开始新的一帧，返回新的序号
    ///
    /// 序号单调递增，从 1 开始
    #[inline]
    pub fn next_frame_serial(&mut self) -> u64 {
        self.frame_serial += 1;
        self.frame_serial
    }

    /// 删除空闲超过 `max_idle_frames` 帧的资源，返回删除的数量
    pub fn collect_garbage(&mut self, max_idle_frames: u64) -> usize {
        let images = self.images.collect(self.frame_serial, max_idle_frames);
        let buffers = self.buffers.collect(self.frame_serial, max_idle_frames);
        if images + buffers > 0 {
            log::debug!(
                "GfxTransientPool: collected {} images and {} buffers at serial {}",
                images,
                buffers,
                self.frame_serial
            );
        }
        images + buffers
    }
}

// image API
impl GfxTransientPool {
    pub fn acquire_image(&mut self, desc: GfxImageDesc) -> GfxImageHandle {
        let (handle, reused) = self.images.acquire(desc, self.frame_serial);
        log::trace!("GfxTransientPool: acquire image {:?} {:?} (reused: {})", handle, desc, reused);
        handle
    }

    pub fn release_image(&mut self, handle: GfxImageHandle) {
        self.images.release(handle, self.frame_serial);
    }

    #[inline]
    pub fn image(&self, handle: GfxImageHandle) -> Option<&GfxTransientEntry<GfxImageDesc>> {
        self.images.entries.get(handle)
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.entries.len()
    }

    #[inline]
    pub fn idle_image_count(&self) -> usize {
        self.images.idle_count()
    }
}

// buffer API
impl GfxTransientPool {
    pub fn acquire_buffer(&mut self, desc: GfxBufferDesc) -> GfxBufferHandle {
        let (handle, reused) = self.buffers.acquire(desc, self.frame_serial);
        log::trace!("GfxTransientPool: acquire buffer {:?} {:?} (reused: {})", handle, desc, reused);
        handle
    }

    pub fn release_buffer(&mut self, handle: GfxBufferHandle) {
        self.buffers.release(handle, self.frame_serial);
    }

    #[inline]
    pub fn buffer(&self, handle: GfxBufferHandle) -> Option<&GfxTransientEntry<GfxBufferDesc>> {
        self.buffers.entries.get(handle)
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.entries.len()
    }

    #[inline]
    pub fn idle_buffer_count(&self) -> usize {
        self.buffers.idle_count()
    }
}

#[cfg(test)]
mod tests {
    use ember_gfx::resources::memory::GfxMemoryType;
    use ember_gfx::vk;

    use super::*;

    fn color_desc(width: u32) -> GfxImageDesc {
        GfxImageDesc::new(
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent2D { width, height: 64 },
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        )
    }

    #[test]
    fn serials_are_monotonic() {
        let mut pool = GfxTransientPool::new();
        let a = pool.next_frame_serial();
        let b = pool.next_frame_serial();
        assert!(b > a);
    }

    #[test]
    fn released_image_is_reused_for_same_desc() {
        let mut pool = GfxTransientPool::new();
        pool.next_frame_serial();

        let first = pool.acquire_image(color_desc(64));
        pool.release_image(first);

        pool.next_frame_serial();
        let other = pool.acquire_image(color_desc(128));
        let again = pool.acquire_image(color_desc(64));

        assert_eq!(again, first);
        assert_ne!(other, first);
        assert_eq!(pool.image_count(), 2);
        assert!(pool.image(again).is_some_and(|entry| entry.in_use() && *entry.desc() == color_desc(64)));
    }

    #[test]
    fn in_use_image_is_not_handed_out_twice() {
        let mut pool = GfxTransientPool::new();
        let a = pool.acquire_image(color_desc(64));
        let b = pool.acquire_image(color_desc(64));
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn double_release_panics() {
        let mut pool = GfxTransientPool::new();
        let a = pool.acquire_image(color_desc(64));
        pool.release_image(a);
        pool.release_image(a);
    }

    #[test]
    fn garbage_collection_drops_idle_entries() {
        let mut pool = GfxTransientPool::new();
        pool.next_frame_serial();

        let desc = GfxBufferDesc::new(256, vk::BufferUsageFlags::UNIFORM_BUFFER, GfxMemoryType::CpuVisible);
        let buffer = pool.acquire_buffer(desc);
        let kept = pool.acquire_buffer(desc);
        pool.release_buffer(buffer);
        assert_eq!(pool.idle_buffer_count(), 1);

        pool.next_frame_serial();
        assert_eq!(pool.collect_garbage(2), 0);

        pool.next_frame_serial();
        pool.next_frame_serial();
        assert_eq!(pool.collect_garbage(2), 1);
        assert_eq!(pool.buffer_count(), 1);
        assert!(pool.buffer(buffer).is_none());
        assert!(pool.buffer(kept).is_some());
    }
}
