use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

mod ai;
mod app;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod scheduler;
mod services;
#[cfg(test)]
mod testutil;

use app::App;
use config::Config;
use error::Result;
use models::SourceKind;
use services::AnalyzeRequest;

/// Extracts, summarizes and tags news articles, and collects daily AI
/// summaries from each user's subscribed sources.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich an article from a URL and/or raw content, then store it
    Analyze {
        #[arg(short, long)]
        url: Option<String>,

        #[arg(short, long)]
        content: Option<String>,

        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Inspect stored articles
    #[command(subcommand)]
    Article(ArticleCommand),

    /// Save an article for a user
    Save { user_id: i64, article_id: i64 },

    /// List a user's saved articles, most recent first
    Saved { user_id: i64 },

    #[command(subcommand)]
    Tags(TagCommand),

    #[command(subcommand)]
    Sources(SourceCommand),

    /// List a user's scheduled summaries, newest first
    Summaries { user_id: i64 },

    #[command(subcommand)]
    Users(UserCommand),

    /// Run one ingestion pass over every user's enabled sources
    Ingest,

    /// Run ingestion on the configured schedule until Ctrl-C
    Daemon,
}

#[derive(Subcommand, Debug)]
enum ArticleCommand {
    Show { id: i64 },
    Summary { id: i64 },
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    List,
    Popular {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    Create { name: String },
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum SourceCommand {
    Add {
        user_id: i64,
        url: String,

        #[arg(short, long, default_value = "")]
        name: String,

        /// rss or scraping
        #[arg(short, long, default_value = "rss")]
        kind: SourceKind,
    },
    List { user_id: i64 },
    Remove { user_id: i64, source_id: i64 },
    Enable { user_id: i64, source_id: i64 },
    Disable { user_id: i64, source_id: i64 },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Add {
        email: String,

        /// Stored as given; never interpreted
        #[arg(long, default_value = "")]
        password_hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON results, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let app = App::new(config).await?;

    if let Err(e) = run(&app, cli.command).await {
        if e.is_client_error() {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
        return Err(e);
    }
    Ok(())
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Analyze { url, content, tags } => {
            print_json(&app.analyze(AnalyzeRequest { url, content, tags }).await?)
        }
        Command::Article(ArticleCommand::Show { id }) => print_json(&app.article(id).await?),
        Command::Article(ArticleCommand::Summary { id }) => {
            println!("{}", app.article_summary(id).await?);
            Ok(())
        }
        Command::Save {
            user_id,
            article_id,
        } => print_json(&app.save_article(user_id, article_id).await?),
        Command::Saved { user_id } => print_json(&app.saved_articles(user_id).await?),
        Command::Tags(cmd) => match cmd {
            TagCommand::List => print_json(&app.tags().await?),
            TagCommand::Popular { limit } => print_json(&app.popular_tags(limit).await?),
            TagCommand::Create { name } => print_json(&app.create_tag(&name).await?),
            TagCommand::Delete { id } => {
                app.delete_tag(id).await?;
                println!("Deleted tag {}", id);
                Ok(())
            }
        },
        Command::Sources(cmd) => match cmd {
            SourceCommand::Add {
                user_id,
                url,
                name,
                kind,
            } => print_json(&app.add_source(user_id, &url, &name, kind).await?),
            SourceCommand::List { user_id } => print_json(&app.sources(user_id).await?),
            SourceCommand::Remove { user_id, source_id } => {
                app.remove_source(user_id, source_id).await?;
                println!("Removed source {}", source_id);
                Ok(())
            }
            SourceCommand::Enable { user_id, source_id } => {
                print_json(&app.set_source_enabled(user_id, source_id, true).await?)
            }
            SourceCommand::Disable { user_id, source_id } => {
                print_json(&app.set_source_enabled(user_id, source_id, false).await?)
            }
        },
        Command::Summaries { user_id } => print_json(&app.scheduled_summaries(user_id).await?),
        Command::Users(UserCommand::Add {
            email,
            password_hash,
        }) => print_json(&app.create_user(&email, &password_hash).await?),
        Command::Ingest => print_json(&app.ingest_now().await?),
        Command::Daemon => app.run_daemon().await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_collects_repeated_tags() {
        let cli = Cli::try_parse_from([
            "newsbrief", "analyze", "--content", "text", "--tag", "news", "--tag", "tech",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze { url, content, tags } => {
                assert_eq!(url, None);
                assert_eq!(content.as_deref(), Some("text"));
                assert_eq!(tags, ["news", "tech"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn source_kind_is_parsed() {
        let cli = Cli::try_parse_from([
            "newsbrief", "sources", "add", "1", "https://blog.test", "--kind", "scraping",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Sources(SourceCommand::Add {
                kind: SourceKind::Scraped,
                ..
            })
        ));
        assert!(Cli::try_parse_from(["newsbrief", "sources", "add", "1", "u", "--kind", "fax"])
            .is_err());
    }
}
