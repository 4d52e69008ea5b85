use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use prqlrs::{compile, get_targets, json, pl_to_rq, prql_to_pl, CompileError, CompileOptions};

/// A pipeline query language compiler that targets SQL
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input file; reads stdin when omitted
    input: Option<PathBuf>,

    /// Target dialect, e.g. `sql.postgres` (overrides the query header)
    #[arg(long)]
    target: Option<String>,

    /// Emit a single compact line instead of formatted SQL
    #[arg(long)]
    no_format: bool,

    /// Skip the trailing compiler signature comment
    #[arg(long)]
    no_signature: bool,

    /// Stop after a stage and print its representation
    #[arg(long, value_enum, default_value_t = Stage::Sql)]
    stage: Stage,

    /// List supported target dialects and exit
    #[arg(long)]
    targets: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    /// Pipeline AST as JSON
    Pl,
    /// Relational IR as JSON
    Rq,
    /// Generated SQL
    Sql,
}

fn main() -> Result<ExitCode> {
    // Setup logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if cli.targets {
        for target in get_targets() {
            println!("{target}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let source = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("cannot read stdin")?;
            buffer
        }
    };

    let options = CompileOptions {
        target: cli.target.clone(),
        format: !cli.no_format,
        signature_comment: !cli.no_signature,
    };

    let result = match cli.stage {
        Stage::Pl => prql_to_pl(&source).and_then(|pl| json::from_pl(&pl)),
        Stage::Rq => prql_to_pl(&source)
            .and_then(pl_to_rq)
            .and_then(|rq| json::from_rq(&rq)),
        Stage::Sql => compile(&source, &options),
    };

    match result {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            report(&error, &source);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report(error: &CompileError, source: &str) {
    eprintln!("error [{}]: {error}", error.stage());
    if let Some(span) = error.span() {
        let upto = &source[..span.start.min(source.len())];
        let line = upto.matches('\n').count() + 1;
        let column = span.start - upto.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
        eprintln!("  at line {line}, column {column}");
    }
}
