pub mod transient_pool;

pub use transient_pool::GfxTransientPool;
