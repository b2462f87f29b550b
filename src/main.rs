//! db-chat - ask a MySQL database questions in plain language.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use db_chat::cli::Cli;
use db_chat::config::Config;
use db_chat::db::MySqlConnector;
use db_chat::error::ChatError;
use db_chat::llm::{create_client, QueryGenerator};
use db_chat::logging;
use db_chat::repl::{Command, Outcome, Repl};
use db_chat::session::{Session, SessionActor, SessionSettings};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ChatError>() {
            Some(chat) => {
                error!("{}: {}", chat.category(), chat);
                eprintln!("{chat}");
            }
            None => {
                error!("{e:#}");
                eprintln!("Error: {e:#}");
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_llm_overrides(&mut config.llm);

    let profile = cli.resolve_connection(&config)?.to_profile()?;
    let settings = SessionSettings::from(&config.session);

    let client = create_client(&config.llm)?;
    let generator = QueryGenerator::new(Arc::from(client))
        .with_timeout(Duration::from_secs(config.llm.timeout_secs));
    let connector = Arc::new(MySqlConnector::new(settings.query_timeout));

    let session = Session::new(connector, generator, settings);
    let (handle, actor) = SessionActor::spawn(session);
    let actor_task = tokio::spawn(actor.run());

    let repl = Repl::new(handle.clone(), profile.clone(), cli.json);
    repl.track(handle.connect(profile.clone())).await?;
    info!(
        connection = %profile.display_string(),
        provider = %config.llm.provider,
        model = %config.llm.model,
        "Session started"
    );

    let outcome = shell(&repl).await;

    handle.close().await?;
    actor_task.await.context("session task failed")?;
    outcome
}

async fn shell(repl: &Repl) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(b"db-chat: ask a question, or type /help for commands.\n")
        .await?;

    loop {
        let database = repl
            .handle()
            .snapshot()
            .await?
            .current_database
            .unwrap_or_else(|| "not connected".to_string());
        stdout.write_all(format!("{database}> ").as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        match repl.run(command).await {
            Outcome::Exit => break,
            Outcome::Print(text) if text.is_empty() => {}
            Outcome::Print(text) => {
                stdout.write_all(text.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        }
    }
    Ok(())
}
