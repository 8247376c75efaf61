mod account_caches;
mod account_store_memory;
mod clock_impl;
mod expiring_cache;

pub use account_caches::*;
pub use account_store_memory::*;
pub use clock_impl::*;
pub use expiring_cache::*;
