use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Pulse binary.
#[derive(Debug, Parser)]
#[command(name = "pulse", version, about = "Pulse social client")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PULSE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings overrides accepted by every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the backend endpoint, e.g. `https://cloud.example.com/v1`.
    #[arg(long = "endpoint", value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// Override the backend project id.
    #[arg(long = "project-id", value_name = "ID", global = true)]
    pub project_id: Option<String>,

    /// Toggle the query cache.
    #[arg(
        long = "cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,

    /// Override where the session secret is stored.
    #[arg(
        long = "session-file",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub session_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Create an account and its user profile.
    SignUp(SignUpArgs),
    /// Sign in with email and password and remember the session.
    SignIn(SignInArgs),
    /// Delete the current session.
    SignOut,
    /// Show the signed-in user.
    Whoami,
    /// Home feed: your posts and posts of users you follow.
    Feed(FeedArgs),
    /// Newest posts across the network.
    Explore(ExploreArgs),
    /// Search post captions.
    Search(SearchArgs),
    /// Recent posts.
    Recent,
    /// Post commands.
    Post(PostArgs),
    /// User commands.
    User(UserArgs),
    /// Newest users.
    Users(UsersArgs),
    /// Follow a user.
    Follow(TargetUserArgs),
    /// Stop following a user.
    Unfollow(TargetUserArgs),
    /// Users that a user follows (defaults to you).
    Following(OptionalUserArgs),
    /// Users following a user (defaults to you).
    Followers(OptionalUserArgs),
    /// Posts you saved.
    Saved,
    /// Posts you liked.
    Liked,
}

#[derive(Debug, Args, Clone)]
pub struct SignUpArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "PULSE_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args, Clone)]
pub struct SignInArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "PULSE_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    /// Override the configured page size.
    #[arg(long = "page-size")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct ExploreArgs {
    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pub pages: u32,
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    pub term: String,
}

#[derive(Debug, Args, Clone)]
pub struct UsersArgs {
    /// Override the configured number of users.
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct TargetUserArgs {
    /// User document id.
    pub user_id: String,
}

#[derive(Debug, Args, Clone)]
pub struct OptionalUserArgs {
    /// User document id; defaults to the signed-in user.
    #[arg(long = "user")]
    pub user_id: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct PostArgs {
    #[command(subcommand)]
    pub command: PostCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PostCommand {
    Show { id: String },
    Create(PostCreateArgs),
    Update(PostUpdateArgs),
    Delete { id: String },
    /// Toggle your like on a post.
    Like { id: String },
    Save { id: String },
    Unsave { id: String },
}

#[derive(Debug, Args, Clone)]
pub struct PostCreateArgs {
    #[arg(long)]
    pub caption: String,
    /// Image to upload.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
    #[arg(long, default_value = "")]
    pub location: String,
    /// Comma-separated tags.
    #[arg(long, default_value = "")]
    pub tags: String,
}

#[derive(Debug, Args, Clone)]
pub struct PostUpdateArgs {
    pub id: String,
    #[arg(long)]
    pub caption: Option<String>,
    /// Replacement image.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
    #[arg(long)]
    pub location: Option<String>,
    /// Comma-separated tags.
    #[arg(long)]
    pub tags: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum UserCommand {
    Show { id: String },
    /// Update your profile.
    Update(UserUpdateArgs),
    Posts { id: String },
}

#[derive(Debug, Args, Clone)]
pub struct UserUpdateArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub bio: Option<String>,
    /// New avatar image.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
}
