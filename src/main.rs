mod cli;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser as _;
use cli::{Cli, CliError, Commands};
use vbnet_parser::lexer::lex;
use vbnet_parser::limits::DEFAULT_CONFIG_FILE;
use vbnet_parser::{ParserLimits, Query, Tree, parse_with_limits};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

// Returns whether the input parsed cleanly
fn run(cli: Cli) -> Result<bool, CliError> {
    let config = cli
        .config
        .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE).to_path_buf());
    let limits = ParserLimits::from_toml_file(&config)?;

    match cli.command {
        Commands::Parse(args) => {
            let tree = parse_file(&args.file, &limits)?;
            if args.sexp {
                println!("{}", tree.to_sexp());
            } else {
                print!("{}", tree);
            }
            report_diagnostics(&args.file, &tree);
            Ok(!tree.has_error())
        }
        Commands::Tokens(args) => {
            let source = read_source(&args.file)?;
            limits.check_input(&source)?;
            let tokens = lex(&source);
            for token in &tokens.list {
                println!(
                    "{}:{} {} {:?}",
                    token.line,
                    token.column,
                    token.kind.as_str(),
                    token.text(&source)
                );
            }
            for error in &tokens.errors {
                eprintln!("{}: {}", args.file.display(), error);
            }
            Ok(tokens.errors.is_empty())
        }
        Commands::Query(args) => {
            let query = Query::new(&args.pattern)?;
            let tree = parse_file(&args.file, &limits)?;
            for (name, node) in query.captures(&tree) {
                println!("{} {} {}", tree.start_point(node), name, tree.text(node));
            }
            report_diagnostics(&args.file, &tree);
            Ok(true)
        }
    }
}

fn read_source(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_file(path: &Path, limits: &ParserLimits) -> Result<Tree, CliError> {
    let source = read_source(path)?;
    Ok(parse_with_limits(&source, limits)?)
}

fn report_diagnostics(path: &Path, tree: &Tree) {
    for diagnostic in tree.diagnostics() {
        eprintln!("{}:{}", path.display(), diagnostic);
    }
}
