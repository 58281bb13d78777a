//! Address codec for the `oid/iid/rid` resource grammar.
//!
//! Everything in here is a pure function over static dictionaries: parsing a
//! path never touches a device record, and an unknown alias is never an error.
//! Devices are free to expose custom objects and resources, so tokens that the
//! dictionaries do not know simply pass through in the form they arrived.

mod dictionary;
mod id;
mod path;

pub use dictionary::*;
pub use id::*;
pub use path::*;
