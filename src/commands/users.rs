use pulse::application::accounts::UpdateUser;
use pulse::config::{UserCommand, UserUpdateArgs, UsersArgs};
use serde_json::Value;

use super::io::read_optional_upload;
use super::print::{state_value, to_value};
use super::{CliError, Context};

pub async fn handle(ctx: &Context, command: UserCommand) -> Result<Value, CliError> {
    match command {
        UserCommand::Show { id } => state_value(ctx.queries.user_by_id(&id).await?),
        UserCommand::Update(args) => update(ctx, args).await,
        UserCommand::Posts { id } => state_value(ctx.queries.user_posts(&id).await?),
    }
}

pub async fn list(ctx: &Context, args: UsersArgs) -> Result<Value, CliError> {
    state_value(ctx.queries.users(args.limit).await?)
}

async fn update(ctx: &Context, args: UserUpdateArgs) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    let file = read_optional_upload(args.file.as_deref()).await?;
    let updated = ctx
        .queries
        .update_user(UpdateUser {
            user_id: user.id,
            name: args.name.unwrap_or(user.name),
            bio: args.bio.unwrap_or(user.bio),
            image_id: user.image_id,
            image_url: user.image_url,
            file,
        })
        .await?;
    to_value(updated)
}
