mod body_bones;
mod pose;
mod serial;
#[allow(clippy::module_inception)]
mod skeleton;

pub use body_bones::*;
pub use pose::*;
pub use serial::*;
pub use skeleton::*;
