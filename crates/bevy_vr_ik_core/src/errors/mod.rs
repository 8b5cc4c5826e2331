mod configuration_error;

pub use configuration_error::*;
