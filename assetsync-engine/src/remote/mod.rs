//! Remote store implementations.

mod dir;

pub use dir::DirectoryRemote;
