pub mod interfaces;
pub mod select;

pub use interfaces::{discover, InterfaceAddress, InterfaceRecord, InterfaceSource};
#[cfg(unix)]
pub use interfaces::SystemInterfaces;
pub use select::{select, SelectError};
