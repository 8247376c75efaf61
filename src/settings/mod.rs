//! Settings are read from a TOML file (`settings/dev.toml` in debug builds)
//! via the `config` crate; the path can be overridden with `--settings`.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
