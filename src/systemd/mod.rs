pub mod actions;
pub mod data;
pub mod directory;
pub mod enums;
pub mod errors;
pub mod formatter;
pub mod sysdbus;

#[cfg(test)]
pub(crate) mod test_utils;

pub use errors::SystemdErrors;
