//! Alias 规划
//!
//! 所有 pass 声明完成后运行一次：
//! 1. 按 pass 顺序处理 image 拷贝，生命周期不重叠的拷贝被折叠成 alias，不需要真正执行；
//! 2. 按 first use 排序，得到物理资源的分配顺序。

use ember_gfx::vk;
use itertools::Itertools;

use crate::frame_graph::resource_id::{FgImageId, FgResourceId};
use crate::frame_graph::resource_info::{FgImageCopy, FgResourceRegistry};

/// alias 规划的结果
#[derive(Clone, Debug, Default)]
pub struct FgAliasPlan {
    /// 按 first use 排序，没有被使用的资源排在最后
    pub(crate) allocation_order: Vec<FgResourceId>,
    /// 按 pass 顺序排列的全部拷贝，包括已经折叠的
    pub(crate) copies: Vec<FgImageCopy>,
    /// 本次规划中被折叠成 alias 的拷贝
    pub(crate) folded: Vec<FgImageCopy>,
}

impl FgAliasPlan {
    #[inline]
    pub fn allocation_order(&self) -> &[FgResourceId] {
        &self.allocation_order
    }

    #[inline]
    pub fn copies(&self) -> &[FgImageCopy] {
        &self.copies
    }

    #[inline]
    pub fn folded_copies(&self) -> &[FgImageCopy] {
        &self.folded
    }
}

/// 沿着 alias 链找到真正拥有物理内存的 image
///
/// 链的长度不可能超过资源数量，超过就说明存在环
pub(crate) fn alias_root(registry: &FgResourceRegistry, image: FgImageId) -> FgImageId {
    let mut current = image;
    for _ in 0..=registry.len() {
        match registry.image(current).alias() {
            Some(next) => current = next,
            None => return current,
        }
    }
    panic!("FrameGraph: Alias cycle detected starting at {:?}", image.id());
}

/// 尝试把一次拷贝折叠成 alias，返回是否成功
fn fold_copy(registry: &mut FgResourceRegistry, copy: &FgImageCopy) -> bool {
    let dst_info = registry.image(copy.dst.into()).clone();

    // 已经折叠过
    if dst_info.alias().is_some() || dst_info.copy_src().is_none() {
        return false;
    }

    assert!(
        dst_info.lifetime().first_use().is_some_and(|first| copy.pass_index <= first),
        "FrameGraph: copy into {:?} at pass {} happens after its first use",
        copy.dst.id(),
        copy.pass_index
    );

    let root = alias_root(registry, copy.src);
    if root.id() == copy.dst.id() {
        panic!("FrameGraph: Alias cycle detected between {:?} and {:?}", copy.src.id(), copy.dst.id());
    }

    let src_lifetime = *registry.image(root).lifetime();
    let can_fold = match (src_lifetime.last_use(), dst_info.lifetime().first_use()) {
        (Some(last), Some(first)) => last < first || (last == first && src_lifetime.can_alias_on_last()),
        _ => false,
    };
    if !can_fold {
        log::debug!(
            "FrameGraph: copy {:?} -> {:?} kept (source last use {:?}, destination first use {:?})",
            copy.src.id(),
            copy.dst.id(),
            src_lifetime.last_use(),
            dst_info.lifetime().first_use()
        );
        return false;
    }

    registry.image_mut(root).register_alias(&dst_info);
    let dst = registry.image_mut(copy.dst.into());
    dst.alias = dst.copy_src.take();

    log::debug!("FrameGraph: copy {:?} -> {:?} folded into alias of {:?}", copy.src.id(), copy.dst.id(), root.id());
    true
}

/// 为没有任何用途的资源补上一个 fallback usage，避免物理资源创建失败
fn apply_fallback_usages(registry: &mut FgResourceRegistry, pass_names: &[&str]) {
    let images = registry
        .iter_images()
        .filter(|(_, info)| info.alias().is_none() && !info.has_usage())
        .map(|(id, info)| (id, info.lifetime().first_use()))
        .collect_vec();
    for (id, first_use) in images {
        let declared_by = first_use.and_then(|index| pass_names.get(index).copied()).unwrap_or("<no pass>");
        log::warn!("FrameGraph: Image declared by \"{}\" has no usage ({:?})", declared_by, id.id());
        registry.image_mut(id).usage |= vk::ImageUsageFlags::SAMPLED;
    }

    let buffers =
        registry.iter_buffers().filter(|(_, info)| info.usage().is_empty()).map(|(id, _)| id).collect_vec();
    for id in buffers {
        log::warn!("FrameGraph: Unused frame graph buffer resource ({:?})", id.id());
        registry.buffer_mut(id).usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
}

/// 规划 alias 和物理资源的分配顺序
///
/// 对已经规划过的注册表再次运行会得到相同的 alias 关系
pub fn plan_aliases(registry: &mut FgResourceRegistry, pass_names: &[&str]) -> FgAliasPlan {
    ember_crate_tools::profile_scope!("FrameGraph::plan_aliases");

    registry.image_copies.sort_by_key(|copy| copy.pass_index);
    let copies = registry.image_copies.clone();

    let folded = copies.iter().filter(|copy| fold_copy(registry, copy)).copied().collect_vec();

    apply_fallback_usages(registry, pass_names);

    let allocation_order = registry
        .iter()
        .sorted_by_key(|(_, entry)| entry.lifetime().first_use().unwrap_or(usize::MAX))
        .map(|(id, _)| id)
        .collect_vec();

    FgAliasPlan { allocation_order, copies, folded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_graph::resource_id::FgMutImageId;

    const FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    const EXTENT: vk::Extent2D = vk::Extent2D { width: 64, height: 64 };

    fn write(registry: &mut FgResourceRegistry, image: FgMutImageId, pass: usize) {
        registry.register_image_usage(image.into(), vk::ImageUsageFlags::COLOR_ATTACHMENT, true, pass);
    }

    fn read(registry: &mut FgResourceRegistry, image: FgMutImageId, pass: usize) {
        registry.register_image_usage(image.into(), vk::ImageUsageFlags::SAMPLED, false, pass);
    }

    fn copy(registry: &mut FgResourceRegistry, dst: FgMutImageId, src: FgMutImageId, pass: usize) {
        registry.register_image_copy(dst, src.into(), pass);
        registry.register_image_usage(src.into(), vk::ImageUsageFlags::TRANSFER_SRC, false, pass);
        registry.register_image_usage(dst.into(), vk::ImageUsageFlags::TRANSFER_DST, true, pass);
    }

    #[test]
    fn copy_after_last_use_is_folded() {
        let mut registry = FgResourceRegistry::new(1);
        let a = registry.declare_image(FORMAT, EXTENT);
        let b = registry.declare_image(FORMAT, EXTENT);
        write(&mut registry, a, 0);
        read(&mut registry, a, 1);
        copy(&mut registry, b, a, 2);
        read(&mut registry, b, 3);

        let plan = plan_aliases(&mut registry, &["p0", "p1", "p2", "p3"]);

        assert_eq!(plan.folded_copies().len(), 1);
        assert_eq!(registry.image(b.into()).alias(), Some(a.into()));
        assert_eq!(registry.image(b.into()).copy_src(), None);
        // 根资源吸收了 alias 的生命周期和用途
        let root = registry.image(a.into());
        assert_eq!(root.lifetime().last_use(), Some(3));
        assert!(root.usage().contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(!root.lifetime().can_alias_on_last());
    }

    #[test]
    fn overlapping_copy_is_kept() {
        let mut registry = FgResourceRegistry::new(1);
        let a = registry.declare_image(FORMAT, EXTENT);
        let b = registry.declare_image(FORMAT, EXTENT);
        write(&mut registry, a, 0);
        copy(&mut registry, b, a, 1);
        read(&mut registry, a, 2);

        let plan = plan_aliases(&mut registry, &["p0", "p1", "p2"]);

        assert!(plan.folded_copies().is_empty());
        assert_eq!(plan.copies().len(), 1);
        assert_eq!(registry.image(b.into()).alias(), None);
        assert_eq!(registry.image(b.into()).copy_src(), Some(a.into()));
    }

    #[test]
    fn planning_twice_gives_same_aliases() {
        let mut registry = FgResourceRegistry::new(1);
        let a = registry.declare_image(FORMAT, EXTENT);
        let b = registry.declare_image(FORMAT, EXTENT);
        let c = registry.declare_image(FORMAT, EXTENT);
        let d = registry.declare_image(FORMAT, EXTENT);
        write(&mut registry, a, 0);
        copy(&mut registry, b, a, 1);
        read(&mut registry, b, 2);
        copy(&mut registry, c, b, 3);
        copy(&mut registry, d, a, 2);
        read(&mut registry, a, 3);

        let names = ["p0", "p1", "p2", "p3"];
        let first = plan_aliases(&mut registry, &names);
        let aliases = registry.iter_images().map(|(id, info)| (id, info.alias(), info.copy_src())).collect_vec();

        let second = plan_aliases(&mut registry, &names);
        let again = registry.iter_images().map(|(id, info)| (id, info.alias(), info.copy_src())).collect_vec();

        assert_eq!(aliases, again);
        assert_eq!(first.allocation_order(), second.allocation_order());
        assert!(second.folded_copies().is_empty());
    }

    #[test]
    fn chained_copies_share_one_root() {
        let mut registry = FgResourceRegistry::new(1);
        let a = registry.declare_image(FORMAT, EXTENT);
        let b = registry.declare_image(FORMAT, EXTENT);
        let c = registry.declare_image(FORMAT, EXTENT);
        write(&mut registry, a, 0);
        copy(&mut registry, b, a, 1);
        copy(&mut registry, c, b, 2);
        read(&mut registry, c, 3);

        plan_aliases(&mut registry, &["p0", "p1", "p2", "p3"]);

        assert_eq!(alias_root(&registry, c.into()), a.into());
        assert_eq!(alias_root(&registry, b.into()), a.into());
    }

    #[test]
    fn unused_resources_get_fallback_usage_and_sort_last() {
        let mut registry = FgResourceRegistry::new(1);
        let unused_image = registry.declare_image(FORMAT, EXTENT);
        let unused_buffer = registry.declare_buffer(128);
        let used = registry.declare_image(FORMAT, EXTENT);
        write(&mut registry, used, 0);

        let plan = plan_aliases(&mut registry, &["p0"]);

        assert_eq!(registry.image(unused_image.into()).usage(), vk::ImageUsageFlags::SAMPLED);
        assert_eq!(registry.buffer(unused_buffer.into()).usage(), vk::BufferUsageFlags::STORAGE_BUFFER);
        assert_eq!(plan.allocation_order()[0], used.id());
        assert_eq!(plan.allocation_order().len(), 3);
    }

    #[test]
    #[should_panic(expected = "Alias cycle detected")]
    fn alias_cycle_is_detected() {
        let mut registry = FgResourceRegistry::new(1);
        let a = registry.declare_image(FORMAT, EXTENT);
        let b = registry.declare_image(FORMAT, EXTENT);
        registry.image_mut(a.into()).alias = Some(b.into());
        registry.image_mut(b.into()).alias = Some(a.into());

        alias_root(&registry, a.into());
    }

    #[test]
    fn mutual_copies_in_one_pass_are_never_folded() {
        let mut registry = FgResourceRegistry::new(1);
        let a = registry.declare_image(FORMAT, EXTENT);
        let b = registry.declare_image(FORMAT, EXTENT);
        copy(&mut registry, b, a, 0);
        copy(&mut registry, a, b, 0);

        let plan = plan_aliases(&mut registry, &["p0"]);
        assert!(plan.folded_copies().is_empty());
    }
}
