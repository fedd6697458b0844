//! Repository implementations for database operations

mod projection;
pub mod ranking;
pub mod ticker;

pub use ranking::*;
pub use ticker::*;
