use super::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(name = "passgate", about = "Account token and session administration")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

/// Each invocation is its own process. With the `memory` store backend (the
/// development default) accounts and tokens vanish when the process exits, so
/// a `register` run is not visible to a later `login` run. Use `demo` to walk
/// a whole lifecycle in one process, or point `store.backend` at `mysql`.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account.
    Register {
        user_name: String,
        password: String,
        #[arg(long, default_value = "")]
        nickname: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Log in and print a fresh token triple.
    Login { user_name: String, password: String },
    /// Check an access token.
    Validate { user_name: String, token: String },
    /// Mint a new access token with a refresh token.
    Rotate {
        user_name: String,
        refresh_token: String,
    },
    /// Check a session token held by this process.
    Session {
        user_name: String,
        session_token: String,
    },
    /// Clear every token of an account.
    Revoke { user_name: String },
    /// Print the public profile of an account.
    Profile { user_name: String },
    /// Walk one account through login, rotation and revocation.
    Demo {
        #[arg(long, default_value = "alice")]
        user_name: String,
        #[arg(long, default_value = "secret")]
        password: String,
    },
}

impl Command {
    /// Whether the command only makes sense against state left by earlier runs.
    pub fn reads_earlier_runs(&self) -> bool {
        !matches!(self, Command::Register { .. } | Command::Demo { .. })
    }
}
