//! Background services

pub mod rotation;

pub use rotation::{RotationHandle, RotationService};
