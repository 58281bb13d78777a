//! Device directory and lifecycle.
//!
//! Every known device is a [`DeviceRecord`] owned by the [`DeviceDirectory`],
//! together with a [`LifeChecker`] deadline. Status moves through
//!
//! ```text
//!            traffic / wake                 sleep declared
//!  offline ------------------> online ------------------------> sleeping
//!     ^                        |   ^                              |
//!     |  lifetime or disconnect|   +------- traffic / wake -------+
//!     +------------------------+                                  |
//!     +------------------ sleep duration + grace -----------------+
//! ```

mod device;
#[allow(clippy::module_inception)]
mod directory;
mod life_checker;

pub use device::*;
pub use directory::*;
pub use life_checker::*;

#[cfg(test)]
mod device_test;
#[cfg(test)]
mod life_checker_test;
