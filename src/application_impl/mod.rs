mod account_service_impl;
mod credential_hasher_impl;
mod token_generator_impl;

pub use account_service_impl::*;
pub use credential_hasher_impl::*;
pub use token_generator_impl::*;
