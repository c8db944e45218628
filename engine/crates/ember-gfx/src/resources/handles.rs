use slotmap::new_key_type;

// 物理资源句柄，由 transient pool 分配，跨帧复用
new_key_type! {
    /// 指向一个物理 Image
    pub struct GfxImageHandle;
    /// 指向一个物理 Buffer
    pub struct GfxBufferHandle;
}
