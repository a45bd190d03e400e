//! Shared SQLite plumbing for Quill services

mod init;

pub use init::open_pool;
