mod account_store;
mod clock;

pub use account_store::*;
pub use clock::*;
