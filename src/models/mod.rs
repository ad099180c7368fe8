pub mod appointment;
pub mod enums;
pub mod guest;
pub mod processing_pool;
pub mod profile;

pub use appointment::*;
pub use enums::*;
pub use guest::*;
pub use processing_pool::*;
pub use profile::*;
