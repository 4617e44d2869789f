//! Flashable artifact builders.
//!
//! - `anykernel` - Packages the compiled image into an AnyKernel3 zip

pub mod anykernel;

pub use anykernel::{create_zip, ensure_anykernel, latest_zip, repack};
