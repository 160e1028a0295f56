pub mod combined;
pub mod config;
pub mod import;
pub mod portion;
pub mod rawlog;
