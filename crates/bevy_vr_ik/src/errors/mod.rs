mod asset_load_error;

pub use asset_load_error::*;
pub use bevy_vr_ik_core::errors::ConfigurationError;
