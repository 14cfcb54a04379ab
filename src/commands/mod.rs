//! CLI commands implementation

pub mod crawl;
pub mod db;
pub mod serve;

pub use crawl::*;
pub use db::*;
pub use serve::*;
