//! Subcommand handlers for the `pulse` binary.
//!
//! Each handler returns the JSON value to print; `dispatch` prints it.

mod accounts;
mod context;
mod feed;
mod io;
mod posts;
mod print;
mod social;
mod users;


use pulse::application::error::ApiError;
use pulse::config::{Command, LoadError};
use pulse::domain::error::DomainError;
use pulse::infra::error::InfraError;
use pulse::infra::remote::RemoteError;
use serde_json::Value;
use thiserror::Error;

pub use context::Context;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load configuration")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to set up the backend client")]
    Backend(#[from] RemoteError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to read input file {path}")]
    InputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to render output")]
    Output(#[from] serde_json::Error),
    #[error("not signed in (run `pulse sign-in` first)")]
    NotSignedIn,
}

impl From<DomainError> for CliError {
    fn from(err: DomainError) -> Self {
        Self::Api(err.into())
    }
}

pub async fn dispatch(ctx: &Context, command: Command) -> Result<(), CliError> {
    let output = run(ctx, command).await?;
    print::print_json(&output)
}

async fn run(ctx: &Context, command: Command) -> Result<Value, CliError> {
    match command {
        Command::SignUp(args) => accounts::sign_up(ctx, args).await,
        Command::SignIn(args) => accounts::sign_in(ctx, args).await,
        Command::SignOut => accounts::sign_out(ctx).await,
        Command::Whoami => accounts::whoami(ctx).await,
        Command::Feed(args) => feed::home(ctx, args).await,
        Command::Explore(args) => feed::explore(ctx, args).await,
        Command::Search(args) => feed::search(ctx, args).await,
        Command::Recent => feed::recent(ctx).await,
        Command::Post(args) => posts::handle(ctx, args.command).await,
        Command::User(args) => users::handle(ctx, args.command).await,
        Command::Users(args) => users::list(ctx, args).await,
        Command::Follow(args) => social::follow(ctx, args).await,
        Command::Unfollow(args) => social::unfollow(ctx, args).await,
        Command::Following(args) => social::following(ctx, args).await,
        Command::Followers(args) => social::followers(ctx, args).await,
        Command::Saved => social::saved(ctx).await,
        Command::Liked => social::liked(ctx).await,
    }
}
