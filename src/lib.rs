// Declare the modules
pub mod api;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod history;
pub mod models;
pub mod persistence;
pub mod prompts;
pub mod resolver;
pub mod rotation;
pub mod session;
pub mod state;
pub mod storage;

use anyhow::Context;
use commands::{Command, Reply};
use config::AppConfig;
use state::AppState;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

fn prompt() {
    print!("> ");
    if let Err(e) = std::io::stdout().flush() {
        log::debug!("Failed to flush prompt: {}", e);
    }
}

async fn run_loop(mut app_state: AppState) -> anyhow::Result<()> {
    println!("SafariMind is ready. Type /help for commands.");
    if !app_state.session.messages().is_empty() {
        println!("Restored {} messages from your last chat.", app_state.session.messages().len());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if line.trim().is_empty() {
            prompt();
            continue;
        }
        let reply = match Command::parse(&line) {
            Ok(command) => commands::execute(&mut app_state, command).await,
            Err(usage) => Ok(Reply::Text(usage)),
        };
        match reply {
            Ok(Reply::Text(text)) => println!("{}", text),
            Ok(Reply::Quit) => break,
            Err(e) => {
                log::error!("Command failed: {:?}", e);
                println!("Something went wrong: {:#}", e);
            }
        }
        prompt();
    }

    app_state.shutdown().await;
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let config = AppConfig::load()?;
        let app_state = AppState::initialize(config).await?;
        run_loop(app_state).await
    })
}
