//! Android kernel builder library.
//!
//! Building blocks for compiling a device kernel with clang, packaging it
//! into an AnyKernel3 flashable zip and reporting progress to Telegram.

pub mod artifact;
pub mod build;
pub mod config;
pub mod git;
pub mod preflight;
pub mod process;
pub mod rebuild;
pub mod telegram;
pub mod timing;
pub mod toolchain;

pub use timing::Timer;
