use pulse::application::pagination::PageRequest;
use pulse::config::{ExploreArgs, FeedArgs, SearchArgs};
use serde_json::{Value, json};

use super::print::{state_value, to_value};
use super::{CliError, Context};

pub async fn home(ctx: &Context, args: FeedArgs) -> Result<Value, CliError> {
    let user = ctx.require_user()?;
    let page_size = args.page_size.unwrap_or(ctx.queries.page_size());
    let request = PageRequest::new(args.page, page_size)?;
    state_value(ctx.queries.home_feed(&user.id, request).await?)
}

/// Load up to `pages` explore pages and print them as one list.
pub async fn explore(ctx: &Context, args: ExploreArgs) -> Result<Value, CliError> {
    let mut query = ctx.queries.explore_query();
    for _ in 0..args.pages.max(1) {
        if !ctx.queries.explore_feed(&mut query).await? {
            break;
        }
    }
    let items: Vec<_> = query.items().collect();
    Ok(json!({
        "pages": query.pages().len(),
        "has_next": query.has_next(),
        "items": to_value(items)?,
    }))
}

pub async fn search(ctx: &Context, args: SearchArgs) -> Result<Value, CliError> {
    state_value(ctx.queries.search_posts(&args.term).await?)
}

pub async fn recent(ctx: &Context) -> Result<Value, CliError> {
    state_value(ctx.queries.recent_posts().await?)
}
