mod device;
mod flags;
mod states;

pub use device::*;
pub use flags::*;
pub use states::*;
