pub mod analyze;
pub mod config;
pub mod draft;
pub mod index;
pub mod init;
pub mod memory;
pub mod questions;
