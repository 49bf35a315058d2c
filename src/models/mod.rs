pub mod code;
pub mod device;
pub mod principal;

pub use code::*;
pub use device::*;
pub use principal::*;
