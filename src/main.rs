//! docbind CLI - inspect and round-trip YAML/JSON documents

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use docbind::ast::{self, Kind, NodeRef};
use docbind::errors::partition;
use docbind::{
    BindError, BindLimits, Decoder, FixSuggestion, FromCore, Registry, SequencedMap, Severity, SyncCore, SyncCtx,
    ValidationError,
};

/// A document's top level as a generic ordered map of raw nodes
type TopLevel = SequencedMap<String, NodeRef>;

#[derive(Parser)]
#[command(name = "docbind")]
#[command(about = "Format-preserving YAML/JSON binding toolkit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a document and report validation diagnostics
    Check {
        /// Path to a .yaml/.json file
        file: PathBuf,

        /// Treat warnings (duplicate keys) as errors
        #[arg(long)]
        strict: bool,
    },

    /// Decode, populate, apply edits, sync and print the document
    Roundtrip {
        /// Path to a .yaml/.json file
        file: PathBuf,

        /// Set a top-level key (value parsed as YAML)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Remove a top-level key
        #[arg(long = "remove", value_name = "KEY")]
        remove: Vec<String>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the document AST with kinds and positions
    Tree {
        /// Path to a .yaml/.json file
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { file, strict } => check(&file, strict),
        Commands::Roundtrip {
            file,
            set,
            remove,
            output,
        } => roundtrip(&file, &set, &remove, output.as_deref()).map(|_| true),
        Commands::Tree { file } => tree(&file).map(|_| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.downcast_ref::<BindError>().and_then(|b| b.fix_suggestion()) {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

fn load(file: &Path) -> Result<NodeRef> {
    let text = fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    Ok(ast::load_str(&text)?)
}

fn decoder() -> Decoder<'static> {
    Decoder::new(Registry::global()).with_limits(BindLimits::from_env())
}

/// Mapping nodes below `node`, in document order
fn nested_mappings(node: &NodeRef, out: &mut Vec<NodeRef>) {
    for child in node.content() {
        if child.is_kind(Kind::Mapping) {
            out.push(child.clone());
        }
        nested_mappings(&child, out);
    }
}

fn check(file: &Path, strict: bool) -> Result<bool> {
    let document = load(file)?;
    let decoder = decoder();

    let (top, mut diagnostics) = decoder.decode::<TopLevel>(&document)?;
    if let Some(root) = document.content().first() {
        let mut mappings = Vec::new();
        nested_mappings(root, &mut mappings);
        for mapping in mappings {
            let (_, errors) = decoder.decode::<TopLevel>(&mapping)?;
            diagnostics.extend(errors);
        }
    }
    diagnostics.sort_by_key(|e| (e.line, e.column));

    for diagnostic in &diagnostics {
        print_diagnostic(diagnostic);
    }

    let (errors, warnings) = partition(&diagnostics);
    let failed = !errors.is_empty() || (strict && !warnings.is_empty());
    if failed {
        println!(
            "{} {}: {} error(s), {} warning(s)",
            "✗".red(),
            file.display(),
            errors.len(),
            warnings.len()
        );
    } else {
        println!(
            "{} {} is valid ({} top-level keys, {} warning(s))",
            "✓".green(),
            file.display(),
            top.len(),
            warnings.len()
        );
    }
    Ok(!failed)
}

fn print_diagnostic(diagnostic: &ValidationError) {
    let label = match diagnostic.severity() {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
    };
    println!("  {} {}", label, diagnostic);
}

fn roundtrip(file: &Path, set: &[String], remove: &[String], output: Option<&Path>) -> Result<()> {
    let document = load(file)?;
    let (mut core, errors) = decoder().decode::<TopLevel>(&document)?;
    if let Some(mismatch) = errors.iter().find(|e| e.is_type_mismatch()) {
        bail!("cannot round-trip {}: {}", file.display(), mismatch);
    }

    let mut model = TopLevel::from_core(&core)?;
    for assignment in set {
        let (key, value) = assignment
            .split_once('=')
            .with_context(|| format!("--set expects KEY=VALUE, got '{}'", assignment))?;
        let value: serde_yaml::Value =
            serde_yaml::from_str(value).with_context(|| format!("invalid YAML value for '{}'", key))?;
        model.set(key.to_string(), ast::from_value(&value));
    }
    for key in remove {
        if model.delete(key).is_none() {
            tracing::warn!(key = %key, "--remove: key not present");
        }
    }

    let root = document.content().first().cloned();
    let node = model
        .sync_core(&SyncCtx::default(), &mut core, root.as_ref())?
        .context("document has no top-level mapping")?;
    if !root.as_ref().map_or(false, |root| root.ptr_eq(&node)) {
        document.write().content = vec![node];
    }
    let text = ast::to_yaml_string(&document)?;

    match output {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} wrote {}", "✓".green(), path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn tree(file: &Path) -> Result<()> {
    let document = load(file)?;
    print_node(&document, 0, "");
    Ok(())
}

fn print_node(node: &NodeRef, depth: usize, label: &str) {
    let indent = "  ".repeat(depth);
    let position = format!("{}:{}", node.line(), node.column()).dimmed();
    let kind = node.kind().map(|k| k.to_string()).unwrap_or_else(|| "empty".to_string());

    match node.kind() {
        Some(Kind::Scalar) => {
            let tag = node.resolved_tag();
            println!(
                "{}{}{} {:?} {} {}",
                indent,
                label,
                kind.cyan(),
                node.value(),
                tag.as_str().dimmed(),
                position
            );
        }
        Some(Kind::Alias) => {
            println!("{}{}{} *{} {}", indent, label, kind.magenta(), node.value(), position);
        }
        Some(Kind::Mapping) => {
            println!("{}{}{} {}", indent, label, kind.cyan().bold(), position);
            for (key, value) in node.pairs() {
                print_node(&value, depth + 1, &format!("{}: ", key.value().bold()));
            }
        }
        _ => {
            println!("{}{}{} {}", indent, label, kind.cyan().bold(), position);
            for item in node.content() {
                let label = if node.is_kind(Kind::Sequence) { "- " } else { "" };
                print_node(&item, depth + 1, label);
            }
        }
    }
}
