pub mod challenge;
pub mod clock;
pub mod complete_registration;
pub mod device;
pub mod device_authorization;
pub mod hasher;
pub mod init_registration;
pub mod policy;

pub use challenge::ChallengeStore;
pub use clock::{Clock, SystemClock};
pub use complete_registration::{
    CompleteRegistrationResponseGenerator, CompleteRegistrationValidator,
};
pub use device::DeviceStore;
pub use device_authorization::{
    DeviceAuthorizationResponseGenerator, DeviceAuthorizationValidator,
};
pub use hasher::DevicePasswordHasher;
pub use init_registration::{InitRegistrationResponseGenerator, InitRegistrationValidator};
