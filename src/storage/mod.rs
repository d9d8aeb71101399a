pub mod cache;

pub use cache::DiskCache;
