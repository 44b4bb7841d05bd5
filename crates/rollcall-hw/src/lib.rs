//! rollcall-hw — camera capture over V4L2.
//!
//! Negotiates an RGB or YUYV stream and hands the engine byte-interleaved
//! RGB frames via the [`rollcall_core::FrameSource`] capability.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
