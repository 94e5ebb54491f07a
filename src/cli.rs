use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docrag",
    about = "Retrieve the most relevant passages from your documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory of .txt/.md documents to index
    #[arg(long, global = true)]
    pub docs: Option<PathBuf>,

    /// Only index documents whose relative path matches this glob
    #[arg(long, global = true)]
    pub glob: Option<String>,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Colbert, global = true)]
    pub embedder: EmbedderKind,

    /// Chunk size in words
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Overlap between adjacent chunks in words
    #[arg(long, global = true)]
    pub overlap: Option<usize>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Mean-pooled ColBERT embeddings
    Colbert,
    /// Model-free feature hashing (offline, lexical only)
    Hashing,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index the documents and retrieve the chunks nearest to a query
    Search(SearchArgs),
    /// Index once, then answer queries read from stdin
    Shell(ShellArgs),
    /// Show how a file would be chunked
    Chunk(ChunkArgs),
    /// Show resolved settings and corpus statistics
    Status(StatusArgs),
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of chunks to return (defaults to the stored top_k)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Collapse chunks with identical text
    #[arg(long)]
    pub dedup: bool,

    /// Print only the joined chunk texts, ready to paste into a prompt
    #[arg(long, conflicts_with = "json")]
    pub context: bool,
}

// -- Shell --

#[derive(Debug, Parser)]
pub struct ShellArgs {
    /// Number of chunks to return per query
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Collapse chunks with identical text
    #[arg(long)]
    pub dedup: bool,
}

// -- Chunk --

#[derive(Debug, Parser)]
pub struct ChunkArgs {
    /// File to chunk
    pub path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip loading the corpus (no embedding work)
    #[arg(long)]
    pub no_load: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show stored settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a setting (model_name, documents_dir, chunk_size, chunk_overlap, top_k)
    Set { key: String, value: String },
    /// Remove a stored setting (revert to default)
    Clear { key: String },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docrag",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["docrag", "search", "hello"]);
        assert_eq!(cli.embedder, EmbedderKind::Colbert);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "hello");
                assert_eq!(args.count, None);
                assert!(!args.json);
                assert!(!args.dedup);
                assert!(!args.context);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "docrag",
            "search",
            "knn",
            "-n",
            "5",
            "--embedder",
            "hashing",
            "--chunk-size",
            "100",
            "--overlap",
            "10",
        ]);
        assert_eq!(cli.embedder, EmbedderKind::Hashing);
        assert_eq!(cli.chunk_size, Some(100));
        assert_eq!(cli.overlap, Some(10));
        match cli.command {
            Command::Search(args) => assert_eq!(args.count, Some(5)),
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn context_conflicts_with_json() {
        let res =
            Cli::try_parse_from(["docrag", "search", "q", "--json", "--context"]);
        assert!(res.is_err());
    }

    #[test]
    fn parse_config_set() {
        let cli = Cli::parse_from(["docrag", "config", "set", "top_k", "5"]);
        match cli.command {
            Command::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, "top_k");
                assert_eq!(value, "5");
            }
            _ => panic!("expected config set"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
