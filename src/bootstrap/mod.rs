mod auth_core;

pub use auth_core::*;
