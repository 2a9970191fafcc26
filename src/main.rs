mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use vidtrack::config::Config;
use vidtrack::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(base_url) = cli.base_url {
        config.service.base_url = base_url;
        config.validate()?;
    }

    observability::init_tracing(&config.logging.filter);

    let ctx = commands::Context::new(config)?;
    match cli.command {
        Commands::Submit(args) => commands::submit(&ctx, args).await?,
        Commands::Status(args) => commands::status(&ctx, args).await?,
        Commands::Watch(args) => commands::watch(&ctx, args).await?,
        Commands::Cancel(args) => commands::cancel(&ctx, args).await?,
        Commands::Tasks => commands::tasks(&ctx).await?,
        Commands::Validate(args) => commands::validate(&ctx, args).await?,
        Commands::Info(args) => commands::info(&ctx, args).await?,
        Commands::Tag(args) => commands::tag(&ctx, args).await?,
        Commands::Model => commands::model(&ctx).await?,
        Commands::Health => commands::health(&ctx).await?,
        Commands::Config => commands::show_config(ctx.config())?,
    }

    Ok(())
}
