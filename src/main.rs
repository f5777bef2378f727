use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

mod api;
mod app;
mod config;
mod handler;
mod notification;
mod tui;
mod ui;

use api::{ApiClient, ChatPayload};
use app::{App, Features};
use config::Config;

#[derive(Parser)]
#[command(name = "farmachat")]
#[command(about = "Terminal chat client for the FarmaAsis pharmacy assistant")]
struct Cli {
    /// Backend origin, overrides the config file
    #[arg(long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        question: String,
    },
    /// Re-index the backend knowledge folder
    Train,
    /// Upload a patient record into the current backend session
    Upload {
        /// Patient file (pdf, docx, doc, xlsx, xls, png, jpg, jpeg)
        file: PathBuf,
    },
    /// Check that the backend is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|_| Config::new());
    let base_url = cli
        .backend
        .or_else(|| config.backend_url.clone())
        .unwrap_or_else(|| api::DEFAULT_BASE_URL.to_string());
    let client = ApiClient::new(&base_url);

    match cli.command {
        Some(Commands::Ask { question }) => ask_once(&client, &question).await,
        Some(Commands::Train) => train_once(&client).await,
        Some(Commands::Upload { file }) => upload_once(&client, &file).await,
        Some(Commands::Health) => health_check(&client).await,
        None => run_tui(client, Features::from_config(&config)).await,
    }
}

async fn run_tui(client: ApiClient, features: Features) -> Result<()> {
    init_logging()?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(tui::TICK_RATE);
    let mut app = App::new(client.clone(), features);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => break,
        }

        app.poll_inflight().await;
    }

    tui::restore()?;

    // The backend keeps patient context per session; drop it on the way out
    // and ignore the outcome, the window is closing anyway.
    if let Err(err) = client.clear_session().await {
        tracing::debug!("clear_session on shutdown failed: {err}");
    }

    Ok(())
}

/// The TUI owns the terminal, so diagnostics go to a file next to the config.
fn init_logging() -> Result<()> {
    let log_dir = dirs::config_dir()
        .context("could not determine config directory")?
        .join("farmachat");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("farmachat.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}

async fn ask_once(client: &ApiClient, question: &str) -> Result<()> {
    println!("🤖 Consultando a FarmaAsis...\n");

    let payload = ChatPayload::new(question.to_string(), &[]);

    match client.send_chat(&payload).await {
        Ok(answer) => {
            println!("{}", "Respuesta:".bold().green());
            println!("{}", answer.answer);
        }
        Err(err) => {
            println!("{}: {}", "Error al consultar el servidor".red(), err);
            println!(
                "Comprueba que el backend está activo en {}",
                client.base_url().bold()
            );
        }
    }

    Ok(())
}

async fn train_once(client: &ApiClient) -> Result<()> {
    println!("📚 Actualizando conocimientos...\n");

    match client.trigger_train().await {
        Ok(status) => {
            if status.is_success() {
                println!("{} {}", "OK:".bold().green(), status.message);
            } else {
                println!("{} {}", "Aviso:".bold().yellow(), status.message);
            }
        }
        Err(err) => {
            println!("{}: {}", "Error al ejecutar /train".red(), err);
        }
    }

    Ok(())
}

async fn upload_once(client: &ApiClient, file: &Path) -> Result<()> {
    if !api::is_accepted_file(file) {
        println!(
            "{}: {}",
            "Tipo de archivo no soportado".yellow(),
            file.display()
        );
        println!("Tipos aceptados: {}", api::ACCEPTED_EXTENSIONS.join(", "));
        return Ok(());
    }

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("could not read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "historia".to_string());

    println!("📤 Subiendo {}...\n", filename.bold());

    match client.upload_patient(&filename, bytes).await {
        Ok(status) => {
            if status.is_success() {
                println!("{} {}", "OK:".bold().green(), status.message);
            } else {
                println!("{} {}", "Error:".bold().red(), status.message);
            }
        }
        Err(err) => {
            println!("{}: {}", "Error al subir historia clínica".red(), err);
        }
    }

    Ok(())
}

async fn health_check(client: &ApiClient) -> Result<()> {
    match client.health().await {
        Ok(health) => {
            println!(
                "{} {} ({})",
                "Backend activo:".bold().green(),
                health.status,
                client.base_url()
            );
        }
        Err(err) => {
            println!("{}: {}", "El backend no responde".red(), err);
            std::process::exit(1);
        }
    }

    Ok(())
}
