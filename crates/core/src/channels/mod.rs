//! Push channel registration and lifecycle

pub mod registry;

pub use registry::{ChannelRegistry, RegistrationSettings};
