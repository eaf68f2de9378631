//! The docscout terminal front end.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use docscout::core::TranscriptSource;
use docscout::tools::TavilySearch;
use docscout::{Session, SessionBuilder, WorkspaceContextBuilder};
use docscout_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

/// Answers questions about a local workspace of markdown documents.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// The workspace root.
    #[arg(short, long, env = "DOCSCOUT_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// API key of the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// The model identifier.
    #[arg(short, long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// API key of Tavily. Web search is disabled without it.
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    tavily_api_key: Option<String>,

    /// Maximum number of web search results.
    #[arg(long, default_value_t = 10)]
    max_search_results: usize,

    /// Maximum number of turns per question.
    #[arg(long, default_value_t = docscout::core::DEFAULT_RECURSION_LIMIT)]
    recursion_limit: usize,

    /// A file holding the system prompt template.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Ask a single question and exit instead of starting a chat.
    question: Option<String>,
}

enum SessionEvent {
    Transcript(String, TranscriptSource),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let system_prompt = match &cli.system_prompt {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(prompt) => prompt,
            Err(err) => {
                eprintln!("cannot read system prompt {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => include_str!("./system_prompt.md").to_owned(),
    };

    let mut context_builder =
        WorkspaceContextBuilder::with_workspace_root(&cli.workspace)
            .with_system_prompt(system_prompt)
            .with_max_search_results(cli.max_search_results)
            .with_recursion_limit(cli.recursion_limit);
    if let Some(model) = &cli.model {
        context_builder = context_builder.with_model(model);
    }
    let context = match context_builder.build() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if !context.root().is_dir() {
        warn!("workspace {:?} is not a directory", context.root());
    }

    let mut config_builder = OpenAIConfigBuilder::with_api_key(&cli.api_key)
        .with_model(context.model());
    if let Some(base_url) = &cli.base_url {
        config_builder = config_builder.with_base_url(base_url);
    }
    let model_provider = OpenAIProvider::new(config_builder.build());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut session_builder = SessionBuilder::new(context, model_provider)
        .on_transcript(move |transcript, source| {
            event_tx
                .send(SessionEvent::Transcript(transcript.to_owned(), source))
                .ok();
        });
    match &cli.tavily_api_key {
        Some(api_key) => {
            session_builder =
                session_builder.with_search_backend(TavilySearch::new(api_key));
        }
        None => info!("TAVILY_API_KEY is not set, web search is disabled"),
    }
    let mut session = session_builder.build();

    println!(
        "{} {}",
        "Workspace:".bright_black(),
        session.context().root().display()
    );

    if let Some(question) = &cli.question {
        ask(&mut session, &mut event_rx, question).await;
        return ExitCode::SUCCESS;
    }

    let mut stdin = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        ask(&mut session, &mut event_rx, line).await;
    }
    ExitCode::SUCCESS
}

async fn ask(
    session: &mut Session,
    event_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    question: &str,
) {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let answer_fut = session.send_message(question);
    tokio::pin!(answer_fut);

    let mut progress_bar = None;
    loop {
        // Create a new progress bar if it has been finished.
        progress_bar
            .get_or_insert_with(|| {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style.clone());
                progress_bar.set_message("🤔 Thinking...");
                progress_bar
            })
            .inc(1);

        let sleep = sleep(Duration::from_millis(100));
        let event = select! {
            biased;
            event = event_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                event
            },
            _ = &mut answer_fut => {
                break;
            },
            _ = sleep => {
                continue;
            }
        };

        // Finish the progress bar before printing anything else.
        if let Some(progress_bar) = progress_bar.take() {
            progress_bar.finish_and_clear();
        }
        print_event(event);
    }

    if let Some(progress_bar) = progress_bar {
        progress_bar.finish_and_clear();
    }
    while let Ok(event) = event_rx.try_recv() {
        print_event(event);
    }
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::Transcript(transcript, TranscriptSource::Assistant) => {
            if !transcript.is_empty() {
                println!(
                    "{}🤖 {}",
                    BAR_CHAR.bright_cyan(),
                    transcript.bright_white()
                );
            }
        }
        SessionEvent::Transcript(transcript, TranscriptSource::Tool) => {
            let name = transcript
                .split_once(':')
                .map_or(transcript.as_str(), |(name, _)| name);
            println!("{}🔧 {}", BAR_CHAR.bright_yellow(), name.bright_black());
        }
        SessionEvent::Transcript(_, TranscriptSource::User) => {}
    }
}

async fn read_line(stdin: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match stdin.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}
