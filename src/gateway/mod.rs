mod context;
#[allow(clippy::module_inception)]
mod gateway;
mod join;
mod requests;

pub use context::*;
pub use gateway::*;
pub use join::*;
pub(crate) use requests::Apply;
pub use requests::WRITE_ATTRS;

#[cfg(test)]
mod join_test;
