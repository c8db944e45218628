use std::fmt;

/// frame graph 中的虚拟资源 id
///
/// `index` 是本帧资源注册表中的下标，`graph` 是签发它的 frame graph 的序号。
/// 序号由 transient pool 单调签发，所以旧帧的 id 不会在新帧里被错误地解析。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FgResourceId {
    pub(crate) index: u32,
    pub(crate) graph: u64,
}

impl FgResourceId {
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn graph(&self) -> u64 {
        self.graph
    }
}

impl fmt::Debug for FgResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.graph)
    }
}

macro_rules! fg_typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) FgResourceId);

        impl $name {
            #[inline]
            pub fn id(&self) -> FgResourceId {
                self.0
            }
        }

        impl From<$name> for FgResourceId {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

fg_typed_id!(
    /// 只读的 image，只能作为 pass 的输入
    FgImageId
);
fg_typed_id!(
    /// 可写的 image，只能由 `FrameGraph::declare_image` 或 `declare_copy` 得到
    FgMutImageId
);
fg_typed_id!(
    /// 只读的 buffer
    FgBufferId
);
fg_typed_id!(
    /// 可写的 buffer
    FgMutBufferId
);

impl From<FgMutImageId> for FgImageId {
    #[inline]
    fn from(value: FgMutImageId) -> Self {
        Self(value.0)
    }
}

impl From<FgMutBufferId> for FgBufferId {
    #[inline]
    fn from(value: FgMutBufferId) -> Self {
        Self(value.0)
    }
}

/// 通过 descriptor 绑定的只读资源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FgResource {
    Image(FgImageId),
    Buffer(FgBufferId),
}

/// 通过 descriptor 绑定的可写资源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FgMutResource {
    Image(FgMutImageId),
    Buffer(FgMutBufferId),
}

impl From<FgImageId> for FgResource {
    fn from(value: FgImageId) -> Self {
        Self::Image(value)
    }
}

impl From<FgMutImageId> for FgResource {
    fn from(value: FgMutImageId) -> Self {
        Self::Image(value.into())
    }
}

impl From<FgBufferId> for FgResource {
    fn from(value: FgBufferId) -> Self {
        Self::Buffer(value)
    }
}

impl From<FgMutBufferId> for FgResource {
    fn from(value: FgMutBufferId) -> Self {
        Self::Buffer(value.into())
    }
}

impl From<FgMutImageId> for FgMutResource {
    fn from(value: FgMutImageId) -> Self {
        Self::Image(value)
    }
}

impl From<FgMutBufferId> for FgMutResource {
    fn from(value: FgMutBufferId) -> Self {
        Self::Buffer(value)
    }
}

impl From<FgMutResource> for FgResource {
    fn from(value: FgMutResource) -> Self {
        match value {
            FgMutResource::Image(image) => image.into(),
            FgMutResource::Buffer(buffer) => buffer.into(),
        }
    }
}
