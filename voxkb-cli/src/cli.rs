use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ask questions of a local knowledge base.
#[derive(Parser, Debug)]
#[command(name = "voxkb", version, about, long_about = None)]
pub struct Cli {
    /// SQLite knowledge base file (overrides VOXKB_DB_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Native output size of the embedding model, when larger than the stored dimension
    #[arg(long, global = true, env = "VOXKB_EMBEDDING_NATIVE_DIMENSION", value_name = "DIM")]
    pub embedding_native_dim: Option<usize>,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a text file into paragraphs and add them
    Ingest {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Source name stored with each passage (defaults to the file name)
        #[arg(long)]
        source: Option<String>,
    },
    /// Add passages given on the command line
    Add {
        #[arg(value_name = "TEXT", required = true)]
        texts: Vec<String>,
    },
    /// Answer one question from the knowledge base
    Ask {
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(long, short = 'c', value_name = "ID")]
        conversation: Option<String>,
        /// Persona instruction replacing the default assistant prompt
        #[arg(long, value_name = "TEXT")]
        system_prompt: Option<String>,
    },
    /// Interactive conversation
    Chat {
        #[arg(long, short = 'c', value_name = "ID")]
        conversation: Option<String>,
        #[arg(long, value_name = "TEXT")]
        system_prompt: Option<String>,
    },
    /// Show matching passages without generating an answer
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(long, short = 'k', value_name = "N")]
        top_k: Option<usize>,
    },
    /// Report collection size and embedding settings
    Stats,
    /// Delete every stored passage
    Reset {
        /// Confirm the irreversible reset
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_global_flags() {
        let cli = Cli::try_parse_from([
            "voxkb",
            "ask",
            "Tell me about Python",
            "--conversation",
            "u1",
            "--db",
            "/tmp/kb.db",
            "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/kb.db")));
        match cli.command {
            Commands::Ask { query, conversation, system_prompt } => {
                assert_eq!(query, "Tell me about Python");
                assert_eq!(conversation.as_deref(), Some("u1"));
                assert!(system_prompt.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn add_requires_text() {
        assert!(Cli::try_parse_from(["voxkb", "add"]).is_err());
        let cli = Cli::try_parse_from(["voxkb", "add", "one", "two"]).unwrap();
        assert!(matches!(cli.command, Commands::Add { texts } if texts.len() == 2));
    }

    #[test]
    fn search_top_k_short_flag() {
        let cli = Cli::try_parse_from(["voxkb", "search", "dogs", "-k", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { top_k: Some(3), .. }));
    }

    #[test]
    fn reset_defaults_to_unconfirmed() {
        let cli = Cli::try_parse_from(["voxkb", "reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Reset { yes: false }));
    }
}
