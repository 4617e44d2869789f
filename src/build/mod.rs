//! Kernel build stages.

pub mod kernel;

pub use kernel::{clean, compile, configure, find_image, kernel_release, reset_log, KernelImage};
