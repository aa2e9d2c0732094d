use crate::formatter::{format_response, format_with_sources};
use anyhow::{anyhow, Context};
use application::index::load_and_embed;
use application::rag_service::RagService;
use clap::Parser;
use colored::Colorize;
use dialoguer::console::Term;
use dialoguer::{theme::ColorfulTheme, Input};
use domain::models::{ChainResponse, ChainStage};
use domain::ports::{Embedder, Generator};
use infrastructure::config::Config;
use infrastructure::file_scanner::FileScanner;
use infrastructure::ollama_client::OllamaClient;
use shared::types::Result;
use std::collections::VecDeque;
use std::io::{self, BufRead, StdinLock, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vault_rag")]
#[command(about = "Ask questions about a folder of markdown notes using a local Ollama model")]
pub struct Cli {
    /// Path to your Obsidian vault or markdown directory (prompted for when omitted)
    pub vault: Option<PathBuf>,

    /// Number of notes handed to the model per query
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Print the file name and a snippet of every retrieved note
    #[arg(long)]
    pub show_sources: bool,

    /// Base URL of the Ollama server
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// Model used for embeddings
    #[arg(long)]
    pub embed_model: Option<String>,

    /// Model used to write answers
    #[arg(long)]
    pub chat_model: Option<String>,

    /// Log every pipeline stage to stderr
    #[arg(long, short)]
    pub verbose: bool,

    /// Answer a single query and exit
    #[arg(long, short)]
    pub query: Option<String>,
}

impl Cli {
    /// Flags win over environment and `.env` values.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(url) = &self.ollama_url {
            config.ollama_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = &self.embed_model {
            config.embed_model = model.clone();
        }
        if let Some(model) = &self.chat_model {
            config.chat_model = model.clone();
        }
    }
}

/// Where queries come from. The terminal in normal use, a queue in tests.
pub trait QuerySource {
    /// `None` once input is exhausted.
    fn next_query(&mut self) -> Result<Option<String>>;
}

/// One query per line from any buffered reader. Used when no terminal is
/// attached, e.g. `vault_rag notes < questions.txt`.
pub struct LineSource<R> {
    reader: R,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> QuerySource for LineSource<R> {
    fn next_query(&mut self) -> Result<Option<String>> {
        Ok(read_trimmed_line(&mut self.reader)?)
    }
}

fn read_trimmed_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Interactive prompt drawn on stdout, so redirecting stderr (where logs go)
/// keeps it working. Falls back to plain stdin lines without a terminal.
pub struct TerminalPrompt {
    theme: ColorfulTheme,
    fallback: Option<LineSource<StdinLock<'static>>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
            fallback: None,
        }
    }

    fn read_fallback(&mut self) -> Result<Option<String>> {
        let lines = self
            .fallback
            .get_or_insert_with(|| LineSource::new(io::stdin().lock()));
        print!("Enter your query: ");
        io::stdout().flush()?;
        lines.next_query()
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl QuerySource for TerminalPrompt {
    fn next_query(&mut self) -> Result<Option<String>> {
        if self.fallback.is_some() {
            return self.read_fallback();
        }
        let input = Input::<String>::with_theme(&self.theme)
            .with_prompt("Enter your query")
            .allow_empty(true)
            .interact_text_on(&Term::stdout());
        match input {
            Ok(line) => Ok(Some(line)),
            Err(dialoguer::Error::IO(err)) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(dialoguer::Error::IO(err)) if err.kind() == io::ErrorKind::NotConnected => {
                tracing::debug!("No terminal attached, reading queries from stdin");
                self.read_fallback()
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl QuerySource for VecDeque<String> {
    fn next_query(&mut self) -> Result<Option<String>> {
        Ok(self.pop_front())
    }
}

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub answered: usize,
    pub failed: usize,
}

fn render(response: &ChainResponse, show_sources: bool) -> String {
    if show_sources {
        format_with_sources(response)
    } else {
        format_response(response)
    }
}

/// Read queries until exhaustion or `exit`/`quit`. A failed query prints one
/// error line and the loop carries on.
pub async fn run_session<E, G, Q, W>(
    service: &RagService<E, G>,
    source: &mut Q,
    out: &mut W,
    show_sources: bool,
) -> Result<SessionStats>
where
    E: Embedder,
    G: Generator,
    Q: QuerySource,
    W: Write,
{
    let mut stats = SessionStats::default();
    while let Some(line) = source.next_query()? {
        if line.trim().is_empty() {
            continue;
        }
        if is_exit_command(&line) {
            writeln!(out, "Goodbye!")?;
            break;
        }
        match service.answer(&line).await {
            Ok(response) => {
                stats.answered += 1;
                let text = render(&response, show_sources);
                tracing::debug!(stage = %ChainStage::Formatted, chars = text.len());
                writeln!(out, "{}", text.green())?;
            }
            Err(err) => {
                stats.failed += 1;
                tracing::debug!("Query failed at stage {}", err.stage());
                writeln!(out, "{}", format!("Error executing query: {err}").red())?;
            }
        }
    }
    out.flush()?;
    Ok(stats)
}

pub struct CliApp {
    config: Config,
    show_sources: bool,
}

impl CliApp {
    pub fn new(config: Config, show_sources: bool) -> Self {
        Self {
            config,
            show_sources,
        }
    }

    fn prompt_vault_path() -> Result<PathBuf> {
        const PROMPT: &str = "Path to your Obsidian vault or markdown directory";
        let input = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(PROMPT)
            .interact_text_on(&Term::stdout());
        let path = match input {
            Ok(path) => path,
            Err(dialoguer::Error::IO(err)) if err.kind() == io::ErrorKind::NotConnected => {
                print!("{PROMPT}: ");
                io::stdout().flush()?;
                read_trimmed_line(&mut io::stdin().lock())?
                    .ok_or_else(|| anyhow!("No vault path was given"))?
            }
            Err(err) => return Err(err.into()),
        };
        Ok(PathBuf::from(path.trim()))
    }

    pub async fn run(&self, cli: &Cli) -> Result<()> {
        let vault = match &cli.vault {
            Some(path) => path.clone(),
            None => Self::prompt_vault_path()?,
        };

        let client = OllamaClient::new(&self.config).context("Failed to create the Ollama client")?;
        if !client.health_check().await {
            tracing::warn!("Ollama does not answer at {}", client.base_url());
        }
        tracing::info!(
            "Using {} for embeddings and {} for answers",
            client.embed_model(),
            client.chat_model()
        );

        println!("Embedding markdown notes...");
        let scanner = FileScanner::new(&vault, &self.config.file_suffixes)
            .with_ignored_dirs(self.config.ignored_dirs.iter().cloned());
        let index = load_and_embed(
            &scanner,
            &client,
            self.config.embed_batch_size,
            self.config.similarity,
        )
        .await
        .context("Failed to embed markdown notes")?;
        tracing::debug!("Ranking notes by {:?} similarity", index.metric());

        println!("Setting up retrieval-augmented QA (RAG)...");
        let service = RagService::new(index, client.clone(), client).with_top_k(self.config.top_k);

        if let Some(query) = &cli.query {
            let response = service
                .answer(query)
                .await
                .context("Error executing query")?;
            println!("{}", render(&response, self.show_sources).green());
            return Ok(());
        }

        println!(
            "{}",
            "Ready to query your notes! Type 'exit' or 'quit' to end.".green()
        );
        let mut prompt = TerminalPrompt::new();
        let stats = run_session(&service, &mut prompt, &mut io::stdout(), self.show_sources).await?;
        tracing::info!(
            "Session ended: {} answered, {} failed",
            stats.answered,
            stats.failed
        );
        Ok(())
    }
}
