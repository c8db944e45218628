pub mod descriptor;
pub mod framebuffer;
pub mod handles;
pub mod image;
pub mod memory;
