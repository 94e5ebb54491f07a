use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use clap::Parser;
use docrag::{
    Chunker,
    ConfigDb,
    CorpusManager,
    DataDir,
    DirectorySource,
    Document,
    Error,
    ModelManager,
    Result,
    config_db::{self, SettingOverrides, Settings},
    corpus::{CorpusState, RetrieveOptions},
    embedding::{Embedder, HashingEmbedder},
    model_manager::ColbertEmbedder,
    search,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction, EmbedderKind};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCRAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match &cli.command {
        Command::Config { action } => match action {
            ConfigAction::Show { json } => config_show(&config_db, *json)?,
            ConfigAction::Set { key, value } => {
                config_db::validate_setting(key, value)?;
                config_db.set_setting(key, value)?;
                println!("Set {key} = {value}");
            }
            ConfigAction::Clear { key } => {
                if config_db.remove_setting(key)? {
                    println!("Cleared {key}");
                } else {
                    println!("{key} was not set");
                }
            }
        },
        Command::Search(args) => {
            let settings = resolve_settings(&cli, &config_db, &data_dir)?;
            let (corpus, source) = open_corpus(&cli, &settings)?;
            corpus.load(&source)?;

            let options = RetrieveOptions::new(
                args.count.unwrap_or(settings.top_k),
            )
            .dedup(args.dedup);
            if args.context {
                let texts: Vec<String> = corpus
                    .retrieve_with(&args.query, options)?
                    .into_iter()
                    .map(|r| r.text)
                    .collect();
                println!("{}", texts.join(docrag::corpus::CONTEXT_SEPARATOR));
            } else {
                let results = search::execute_search(&corpus, &args.query, options)?;
                if args.json {
                    println!("{}", search::format_json(&results, &args.query)?);
                } else {
                    println!("{}", search::format_human(&results));
                }
            }
        }
        Command::Shell(args) => {
            let settings = resolve_settings(&cli, &config_db, &data_dir)?;
            let (corpus, source) = open_corpus(&cli, &settings)?;
            corpus.load(&source)?;
            let options =
                RetrieveOptions::new(args.count.unwrap_or(settings.top_k))
                    .dedup(args.dedup);
            run_shell(&corpus, &source, options)?;
        }
        Command::Chunk(args) => {
            let settings = resolve_settings(&cli, &config_db, &data_dir)?;
            cmd_chunk(&settings, args)?;
        }
        Command::Status(args) => {
            let settings = resolve_settings(&cli, &config_db, &data_dir)?;
            cmd_status(&cli, &data_dir, &settings, args)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn resolve_settings(
    cli: &Cli,
    config_db: &ConfigDb,
    data_dir: &DataDir,
) -> Result<Settings> {
    let overrides = SettingOverrides {
        model: cli.model.clone(),
        documents_dir: cli.docs.clone(),
        chunk_size: cli.chunk_size,
        overlap: cli.overlap,
    };
    Settings::resolve(config_db, &overrides, &data_dir.documents_dir()?)
}

fn build_embedder(kind: EmbedderKind, settings: &Settings) -> Arc<dyn Embedder> {
    match kind {
        EmbedderKind::Colbert => Arc::new(ColbertEmbedder::new(
            ModelManager::with_model_id(settings.model.clone()),
        )),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
    }
}

fn open_corpus(
    cli: &Cli,
    settings: &Settings,
) -> Result<(CorpusManager, DirectorySource)> {
    let chunker = Chunker::new(settings.chunking()?);
    let corpus =
        CorpusManager::new(build_embedder(cli.embedder, settings), chunker);

    let mut source = DirectorySource::new(&settings.documents_dir);
    if let Some(pattern) = &cli.glob {
        source = source.with_glob(pattern)?;
    }
    Ok((corpus, source))
}

fn run_shell(
    corpus: &CorpusManager,
    source: &DirectorySource,
    options: RetrieveOptions,
) -> Result<()> {
    eprintln!("Type a query, :reload to re-index, :quit to exit.");
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let query = line.trim();
        match query {
            "" => continue,
            ":quit" | ":q" => break,
            ":reload" => match corpus.reload(source) {
                Ok(report) => eprintln!(
                    "Reloaded {} chunk(s) from {} document(s)",
                    report.chunks, report.documents
                ),
                Err(e) => eprintln!("Reload failed, keeping previous corpus: {e}"),
            },
            _ => {
                let results = search::execute_search(corpus, query, options)?;
                writeln!(stdout, "{}", search::format_human(&results))?;
            }
        }
        stdout.flush()?;
    }

    Ok(())
}

#[derive(Serialize)]
struct ChunkView<'a> {
    ordinal: usize,
    words: usize,
    text: &'a str,
}

fn cmd_chunk(settings: &Settings, args: &cli::ChunkArgs) -> Result<()> {
    let bytes = std::fs::read(&args.path)?;
    let document = Document::new(
        args.path.to_string_lossy(),
        String::from_utf8_lossy(&bytes),
    );
    let chunks = Chunker::new(settings.chunking()?).chunk_document(&document);

    if args.json {
        let views: Vec<ChunkView<'_>> = chunks
            .iter()
            .map(|c| ChunkView {
                ordinal: c.ordinal,
                words: c.text.split(' ').count(),
                text: &c.text,
            })
            .collect();
        let json = serde_json::to_string(&views)
            .map_err(|e| Error::Config(format!("failed to encode JSON: {e}")))?;
        println!("{json}");
    } else {
        for c in &chunks {
            println!(
                "--- chunk {} ({} words) ---\n{}",
                c.ordinal,
                c.text.split(' ').count(),
                c.text
            );
        }
        println!("\n{} chunk(s)", chunks.len());
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusView<'a> {
    data_dir: String,
    #[serde(flatten)]
    settings: &'a Settings,
    #[serde(skip_serializing_if = "Option::is_none")]
    corpus: Option<docrag::corpus::LoadReport>,
}

fn cmd_status(
    cli: &Cli,
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::StatusArgs,
) -> Result<()> {
    let report = if args.no_load {
        None
    } else {
        let (corpus, source) = open_corpus(cli, settings)?;
        let report = corpus.load(&source)?;
        if corpus.state() == CorpusState::Empty {
            tracing::info!("corpus is empty");
        }
        Some(report)
    };

    if args.json {
        let view = StatusView {
            data_dir: data_dir.root().display().to_string(),
            settings,
            corpus: report,
        };
        let json = serde_json::to_string(&view)
            .map_err(|e| Error::Config(format!("failed to encode JSON: {e}")))?;
        println!("{json}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Documents: {}", settings.documents_dir.display());
        println!("Model: {}", settings.model);
        println!(
            "Chunking: {} words, {} overlap",
            settings.chunk_size, settings.chunk_overlap
        );
        println!("Default top_k: {}", settings.top_k);
        if let Some(report) = report {
            println!(
                "Corpus: {} document(s), {} skipped, {} chunk(s), dimension {}",
                report.documents, report.skipped, report.chunks, report.dimension
            );
        }
    }
    Ok(())
}

fn config_show(config_db: &ConfigDb, json: bool) -> Result<()> {
    let settings = config_db.list_settings()?;

    if json {
        let map: serde_json::Map<String, serde_json::Value> = settings
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        println!("{}", serde_json::Value::Object(map));
    } else if settings.is_empty() {
        println!("No stored settings.");
    } else {
        for (key, value) in &settings {
            println!("{key} = {value}");
        }
    }
    Ok(())
}
