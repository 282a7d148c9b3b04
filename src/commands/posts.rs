use pulse::application::error::ApiError;
use pulse::application::posts::{NewPost, UpdatePost};
use pulse::cache::QueryState;
use pulse::config::{PostCommand, PostCreateArgs, PostUpdateArgs};
use pulse::domain::entities::Post;
use pulse::domain::posts::toggle_like;
use serde_json::{Value, json};

use super::io::{read_optional_upload, read_upload};
use super::print::{state_value, to_value};
use super::{CliError, Context};

pub async fn handle(ctx: &Context, command: PostCommand) -> Result<Value, CliError> {
    match command {
        PostCommand::Show { id } => state_value(ctx.queries.post_by_id(&id).await?),
        PostCommand::Create(args) => create(ctx, args).await,
        PostCommand::Update(args) => update(ctx, args).await,
        PostCommand::Delete { id } => delete(ctx, &id).await,
        PostCommand::Like { id } => like(ctx, &id).await,
        PostCommand::Save { id } => save(ctx, &id).await,
        PostCommand::Unsave { id } => unsave(ctx, &id).await,
    }
}

async fn existing(ctx: &Context, post_id: &str) -> Result<Post, CliError> {
    match ctx.queries.post_by_id(post_id).await? {
        QueryState::Ready(post) => Ok(post),
        QueryState::Disabled => Err(ApiError::Precondition("post_id").into()),
    }
}

async fn create(ctx: &Context, args: PostCreateArgs) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    let file = read_upload(&args.file).await?;
    let post = ctx
        .queries
        .create_post(NewPost {
            user_id: user.id,
            caption: args.caption,
            file,
            location: args.location,
            tags: args.tags,
        })
        .await?;
    to_value(post)
}

/// Unspecified fields keep their current values.
async fn update(ctx: &Context, args: PostUpdateArgs) -> Result<Value, CliError> {
    ctx.require_user()?;
    let current = existing(ctx, &args.id).await?;
    let file = read_optional_upload(args.file.as_deref()).await?;
    let post = ctx
        .queries
        .update_post(UpdatePost {
            post_id: current.id,
            caption: args.caption.unwrap_or(current.caption),
            image_id: current.image.id,
            image_url: current.image.url,
            file,
            location: args.location.unwrap_or(current.location),
            tags: args.tags.unwrap_or_else(|| current.tags.join(",")),
        })
        .await?;
    to_value(post)
}

async fn delete(ctx: &Context, post_id: &str) -> Result<Value, CliError> {
    ctx.require_user()?;
    let post = existing(ctx, post_id).await?;
    ctx.queries.delete_post(&post.id, &post.image.id).await?;
    Ok(json!({ "deleted": post.id }))
}

/// Add the signed-in user's like, or remove it when already present.
async fn like(ctx: &Context, post_id: &str) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    let post = existing(ctx, post_id).await?;
    let likes = toggle_like(&post.likes, &user.id);
    let post = ctx.queries.like_post(&post.id, likes).await?;
    to_value(post)
}

async fn save(ctx: &Context, post_id: &str) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    let saved = ctx.queries.save_post(&user.id, post_id).await?;
    to_value(saved)
}

async fn unsave(ctx: &Context, post_id: &str) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    let record = ctx
        .queries
        .services()
        .posts
        .find_saved_record(&user.id, post_id)
        .await?
        .ok_or(ApiError::NotFound {
            entity: "saved post",
        })?;
    ctx.queries.delete_saved_post(&record.id).await?;
    Ok(json!({ "unsaved": post_id }))
}
