mod opts;
mod output;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use audit_chat::{
    ClientConfig, CredentialProvider, HttpCredentialProvider, HttpSessionBackend,
    HttpStreamTransport, QuerySettings, SessionOrchestrator, TurnCanceller, new_exchange_id,
};
use opts::ClientOpts;

#[derive(Parser, Debug)]
#[command(name = "audit-chat", version, about = "Compliance audit chat client")]
struct Cli {
    #[command(flatten)]
    opts: ClientOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat within an audit session
    Chat(SessionArgs),

    /// Ask a single question and print the streamed answer
    Ask {
        #[command(flatten)]
        session: SessionArgs,

        /// Question to ask
        question: String,
    },

    /// Print a conversation's stored history
    History(SessionArgs),
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Audit session id (env: AUDIT_CHAT_SESSION)
    #[arg(short, long, env = "AUDIT_CHAT_SESSION")]
    session: String,

    /// Conversation id to resume; a new one is generated when omitted
    #[arg(short, long)]
    conversation: Option<String>,
}

impl SessionArgs {
    fn conversation_id(&self) -> String {
        self.conversation.clone().unwrap_or_else(new_exchange_id)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file()?;
    let cli = Cli::parse();
    setup_logging();

    let config = cli.opts.client_config()?;
    let mut orchestrator = build_orchestrator(&config)?;

    match cli.command {
        Command::Chat(args) => cmd_chat(&mut orchestrator, &args).await,
        Command::Ask { session, question } => {
            cmd_ask(&mut orchestrator, &session, &question).await
        }
        Command::History(args) => cmd_history(&mut orchestrator, &args).await,
    }
}

/// Pick up settings from `.env` in the working directory, if there is one.
fn load_env_file() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(error) if error.not_found() => Ok(()),
        Err(error) => Err(error).context("load .env"),
    }
}

/// Log to stderr so streamed answers on stdout stay clean.
fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("audit_chat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_orchestrator(config: &ClientConfig) -> Result<SessionOrchestrator> {
    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(HttpCredentialProvider::from_config(config));
    let transport = HttpStreamTransport::new(config, credentials.clone())
        .context("create stream transport")?;
    let backend = HttpSessionBackend::new(config.clone(), credentials)
        .context("create session backend")?;
    Ok(SessionOrchestrator::new(
        Arc::new(backend),
        Arc::new(transport),
        QuerySettings::from(config),
    ))
}

async fn cmd_history(orchestrator: &mut SessionOrchestrator, args: &SessionArgs) -> Result<()> {
    let summary = orchestrator
        .initialize(&args.session, &args.conversation_id())
        .await?;
    output::print_summary(&summary);
    if let Some(conversation) = orchestrator.conversation() {
        output::print_history(conversation);
    }
    Ok(())
}

async fn cmd_ask(
    orchestrator: &mut SessionOrchestrator,
    args: &SessionArgs,
    question: &str,
) -> Result<()> {
    orchestrator
        .initialize(&args.session, &args.conversation_id())
        .await?;
    let interrupt = spawn_interrupt_watcher(orchestrator.canceller());
    let completed = ask(orchestrator, question).await;
    interrupt.abort();
    if completed? {
        Ok(())
    } else {
        anyhow::bail!("question was not answered")
    }
}

async fn cmd_chat(orchestrator: &mut SessionOrchestrator, args: &SessionArgs) -> Result<()> {
    let summary = orchestrator
        .initialize(&args.session, &args.conversation_id())
        .await?;
    output::print_summary(&summary);
    if let Some(conversation) = orchestrator.conversation() {
        output::print_history(conversation);
    }
    println!("commands: /history /sources /documents /new /quit");

    let quit = Arc::new(Notify::new());
    let interrupt = spawn_quit_or_cancel_watcher(orchestrator.canceller(), quit.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().context("flush stdout")?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("read stdin")?,
            _ = quit.notified() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                if let Some(conversation) = orchestrator.conversation() {
                    output::print_history(conversation);
                }
            }
            "/sources" => {
                let sources = orchestrator
                    .conversation()
                    .and_then(|conversation| conversation.last_completed_answer())
                    .map(|answer| answer.sources.clone())
                    .unwrap_or_default();
                if sources.is_empty() {
                    println!("(no sources cited)");
                } else {
                    for source in sources {
                        println!("  {source}");
                    }
                }
            }
            "/documents" => output::print_documents(orchestrator.document_buckets()),
            "/new" => {
                let summary = orchestrator
                    .initialize(&args.session, &new_exchange_id())
                    .await?;
                output::print_summary(&summary);
            }
            question => {
                ask(orchestrator, question).await?;
            }
        }
    }

    interrupt.abort();
    Ok(())
}

/// Stream one answer to stdout. Returns whether it completed.
async fn ask(orchestrator: &mut SessionOrchestrator, question: &str) -> Result<bool> {
    let mut stream = orchestrator.begin_turn(question)?;
    let mut stdout = std::io::stdout();
    let outcome = orchestrator
        .drive_turn_with(&mut stream, |frame| {
            let _ = write!(stdout, "{frame}");
            let _ = stdout.flush();
        })
        .await;
    let status = orchestrator.status();
    output::print_outcome(&outcome, status.error.as_deref());
    Ok(matches!(outcome, audit_chat::TurnOutcome::Completed { .. }))
}

/// Ctrl-C cancels the answer being streamed.
fn spawn_interrupt_watcher(canceller: TurnCanceller) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !canceller.cancel() {
                tracing::debug!("interrupt with no active stream");
            }
        }
    })
}

/// Ctrl-C cancels the answer being streamed, or quits when idle.
fn spawn_quit_or_cancel_watcher(
    canceller: TurnCanceller,
    quit: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !canceller.cancel() {
                quit.notify_one();
                break;
            }
        }
    })
}
