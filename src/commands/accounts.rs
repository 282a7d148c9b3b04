use pulse::application::accounts::NewUser;
use pulse::config::{SignInArgs, SignUpArgs};
use serde_json::{Value, json};
use tracing::warn;

use super::print::{state_value, to_value};
use super::{CliError, Context};

pub async fn sign_up(ctx: &Context, args: SignUpArgs) -> Result<Value, CliError> {
    let user = ctx
        .queries
        .create_user_account(NewUser {
            name: args.name,
            username: args.username,
            email: args.email,
            password: args.password,
        })
        .await?;
    to_value(user)
}

/// Sign in and persist the session secret for later invocations.
pub async fn sign_in(ctx: &Context, args: SignInArgs) -> Result<Value, CliError> {
    let session = ctx.queries.sign_in(&args.email, &args.password).await?;
    ctx.session_file.store(&session.secret).await?;
    let user = ctx.require_user()?;
    Ok(json!({ "session_id": session.id, "user": to_value(user)? }))
}

/// The local session file is removed even when the remote call fails.
pub async fn sign_out(ctx: &Context) -> Result<Value, CliError> {
    let remote = ctx.queries.sign_out().await;
    ctx.session_file.clear().await?;
    if let Err(err) = &remote {
        warn!(error = %err, "remote sign-out failed; local session removed");
    }
    remote?;
    Ok(json!({ "signed_out": true }))
}

pub async fn whoami(ctx: &Context) -> Result<Value, CliError> {
    ctx.require_user()?;
    state_value(ctx.queries.current_user().await?)
}
