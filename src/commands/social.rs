use pulse::config::{OptionalUserArgs, TargetUserArgs};
use serde_json::{Value, json};

use super::print::{state_value, to_value};
use super::{CliError, Context};

pub async fn follow(ctx: &Context, args: TargetUserArgs) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    let record = ctx.queries.follow_user(&user.id, &args.user_id).await?;
    to_value(record)
}

pub async fn unfollow(ctx: &Context, args: TargetUserArgs) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    ctx.queries.unfollow_user(&user.id, &args.user_id).await?;
    Ok(json!({ "unfollowed": args.user_id }))
}

pub async fn following(ctx: &Context, args: OptionalUserArgs) -> Result<Value, CliError> {
    let user_id = target(ctx, args)?;
    state_value(ctx.queries.user_following(&user_id).await?)
}

pub async fn followers(ctx: &Context, args: OptionalUserArgs) -> Result<Value, CliError> {
    let user_id = target(ctx, args)?;
    state_value(ctx.queries.user_followers(&user_id).await?)
}

pub async fn saved(ctx: &Context) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    state_value(ctx.queries.saved_posts(&user.id).await?)
}

pub async fn liked(ctx: &Context) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    state_value(ctx.queries.liked_posts(&user.id).await?)
}

fn target(ctx: &Context, args: OptionalUserArgs) -> Result<String, CliError> {
    match args.user_id {
        Some(user_id) => Ok(user_id),
        None => Ok(ctx.require_user()?.id),
    }
}
