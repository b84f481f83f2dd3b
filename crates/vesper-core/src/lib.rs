//! Core types and math for the Vesper renderer.
//!
//! This crate provides the foundational types used throughout the workspace:
//! - Engine-wide error type
//! - Explicit object id allocation
//! - Transform math shared by the scene and render systems

pub mod error;
pub mod ids;
pub mod math;

pub use error::{Error, Result};
pub use ids::{IdAllocator, ObjectId};
pub use math::Transform;
