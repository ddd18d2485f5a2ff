use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use vbnet_parser::{LimitError, QueryError};

#[derive(Parser)]
#[command(name = "vbnet-parser")]
#[command(about = "VB.NET concrete syntax tree parser")]
pub struct Cli {
    /// Limits file (TOML with a [limits] table)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a source file and print its syntax tree
    Parse(ParseArgs),
    /// Print the token stream of a source file
    Tokens(TokensArgs),
    /// Run a structural query and print every capture
    Query(QueryArgs),
}

#[derive(clap::Args)]
pub struct ParseArgs {
    /// Input file path
    pub file: PathBuf,

    /// Print a one-line s-expression instead of the outline
    #[arg(long)]
    pub sexp: bool,
}

#[derive(clap::Args)]
pub struct TokensArgs {
    /// Input file path
    pub file: PathBuf,
}

#[derive(clap::Args)]
pub struct QueryArgs {
    /// Input file path
    pub file: PathBuf,

    /// Query pattern, e.g. "(method_declaration name: (identifier) @name)"
    pub pattern: String,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Limits(#[from] LimitError),

    #[error(transparent)]
    Query(#[from] QueryError),
}
