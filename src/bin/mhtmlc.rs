//! mHTML compiler CLI
//!
//! Usage:
//!   mhtmlc page.mhtml
//!   mhtmlc --config site.yaml --var title="'Home'" --output out.html page.mhtml
//!   RUST_LOG=mhtml=debug mhtmlc --strict *.mhtml

use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mhtml::{
    add_default_styles, Compiler, CompilerConfig, ExprEngine, ExpressionEvaluator, MhtmlError,
    Scope,
};

/// Compile mHTML (magical HTML) files into plain HTML
#[derive(Parser, Debug)]
#[command(name = "mhtmlc", version)]
struct Args {
    /// YAML configuration file (branding, defaultStyles, maxDepth, globals)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Write output here instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Omit the provenance comment
    #[arg(long)]
    no_branding: bool,

    /// Append the default stylesheet
    #[arg(long)]
    default_styles: bool,

    /// Global binding NAME=EXPR, EXPR evaluated as an expression (repeatable)
    #[arg(long = "var", value_parser = parse_key_val)]
    vars: Vec<(String, String)>,

    /// Exit with status 1 if any node fails to compile
    #[arg(long)]
    strict: bool,

    /// Input files
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid NAME=EXPR pair: {}", s))?;
    Ok((s[..pos].trim().to_string(), s[pos + 1..].to_string()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("✗ {:#}", e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<i32> {
    let mut config = match &args.config {
        Some(path) => CompilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CompilerConfig::default(),
    };
    if args.no_branding {
        config.branding = false;
    }
    if args.default_styles {
        config.default_styles = true;
    }

    let scope = build_scope(&config.globals, &args.vars)?;
    let compiler = Compiler::from_config(&config);

    let mut exit_code = 0;
    let mut output = String::new();

    for path in &args.files {
        let markup = match fs::read_to_string(path) {
            Ok(markup) => markup,
            Err(e) => {
                eprintln!("✗ {}: could not read file: {}", path.display(), e);
                exit_code = 1;
                continue;
            }
        };

        let report = compiler.compile_report(&markup, &scope, config.branding);
        if report.failures.is_empty() {
            eprintln!("✓ {} compiled", path.display());
        } else {
            eprintln!(
                "✗ {} compiled with {} skipped node(s):",
                path.display(),
                report.failures.len()
            );
            for failure in &report.failures {
                print_error(failure.index, &failure.error);
            }
            if args.strict {
                exit_code = 1;
            }
        }
        if report.halted {
            eprintln!("  halted: content after <halt> was not compiled");
        }
        output.push_str(&report.html);
    }

    if config.default_styles {
        output = add_default_styles(&output);
    }

    match &args.output {
        Some(path) => fs::write(path, &output)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", output),
    }

    Ok(exit_code)
}

/// Config globals plus `--var` bindings, each evaluated against the globals.
fn build_scope(globals: &Scope, vars: &[(String, String)]) -> Result<Scope> {
    let engine = ExprEngine;
    let mut scope = globals.clone();
    for (name, source) in vars {
        let value = engine
            .evaluate(source, globals)
            .with_context(|| format!("Invalid --var {}={}", name, source))?;
        scope.insert(name.clone(), value);
    }
    Ok(scope)
}

fn print_error(index: usize, error: &MhtmlError) {
    match error {
        MhtmlError::Expression {
            directive,
            attribute,
            source,
        } => {
            eprintln!("  node {}: <{}> attribute '{}':", index, directive, attribute);
            eprintln!("    {}", source);
        }
        MhtmlError::Interpolation { directive, source } => {
            eprintln!("  node {}: interpolation in <{}>:", index, directive);
            eprintln!("    {}", source);
        }
        MhtmlError::InvalidDirective { directive, reason } => {
            eprintln!("  node {}: invalid <{}>:", index, directive);
            eprintln!("    {}", reason);
        }
        MhtmlError::MaxNestingDepthExceeded { max_depth } => {
            eprintln!("  node {}: maximum nesting depth ({}) exceeded", index, max_depth);
        }
        e => {
            eprintln!("  node {}: {}", index, e);
        }
    }
}
