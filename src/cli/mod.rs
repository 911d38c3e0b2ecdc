//! CLI module for the semantic response cache
//!
//! Each subcommand opens the configured snapshot files, performs one cache
//! operation and prints the result as JSON:
//! - `stats`: contents, counters and effective configuration
//! - `lookup`: similarity search for a query
//! - `put`: store a response
//! - `sweep`: age-based invalidation
//! - `clear`: drop everything

mod commands;

use clap::{Parser, Subcommand, ValueEnum};

pub use commands::{execute, run};

/// Semantic response cache - reuse answers for semantically similar questions
#[derive(Parser)]
#[command(name = "semantic-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show cache statistics
    Stats {
        #[arg(long, value_enum, default_value_t = StatsFormat::Json)]
        format: StatsFormat,
    },

    /// Look up a cached response for a query
    Lookup {
        query: String,
        /// Override the configured similarity threshold for this lookup
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Store a response for a query
    Put {
        query: String,
        response: String,
        #[arg(long)]
        conversation_id: Option<String>,
        #[arg(long)]
        task_id: Option<String>,
        /// Tool used while producing the response (repeatable)
        #[arg(long = "tool")]
        tools: Vec<String>,
    },

    /// Remove entries at least this many hours old (defaults to the TTL)
    Sweep {
        #[arg(long)]
        max_age_hours: Option<f64>,
    },

    /// Remove every entry and reset counters
    Clear,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFormat {
    Json,
    Prometheus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put_with_tools() {
        let cli = Cli::try_parse_from([
            "semantic-cache",
            "put",
            "what is rust",
            "a language",
            "--task-id",
            "t-1",
            "--tool",
            "search",
            "--tool",
            "calculator",
        ])
        .unwrap();

        match cli.command {
            Command::Put {
                query,
                task_id,
                tools,
                conversation_id,
                ..
            } => {
                assert_eq!(query, "what is rust");
                assert_eq!(task_id.as_deref(), Some("t-1"));
                assert_eq!(tools, vec!["search", "calculator"]);
                assert!(conversation_id.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_stats_format() {
        let cli = Cli::try_parse_from(["semantic-cache", "stats", "--format", "prometheus"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Stats {
                format: StatsFormat::Prometheus
            }
        ));

        let cli = Cli::try_parse_from(["semantic-cache", "stats"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Stats {
                format: StatsFormat::Json
            }
        ));
    }

    #[test]
    fn test_parse_lookup_threshold() {
        let cli =
            Cli::try_parse_from(["semantic-cache", "lookup", "hello", "--threshold", "0.75"]).unwrap();

        match cli.command {
            Command::Lookup { query, threshold } => {
                assert_eq!(query, "hello");
                assert_eq!(threshold, Some(0.75));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["semantic-cache"]).is_err());
    }
}
