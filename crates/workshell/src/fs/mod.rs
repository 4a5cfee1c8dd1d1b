//! Virtual filesystem for Workshell
//!
//! Scripts never touch the host filesystem. Everything they read or write
//! goes through the [`FileSystem`] trait; [`InMemoryFs`] is the default
//! implementation.

mod memory;
mod traits;

pub use memory::InMemoryFs;
pub use traits::{DirEntry, FileSystem, FileType, Metadata};
