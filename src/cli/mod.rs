//! Command-line interface for sdtree.
//!
//! Offline commands work on a local structured-data payload (JSON, in either
//! wire shape) and a definition file. `fetch` and `reconcile` talk to the
//! configured content service.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use serde_json::Value;

use crate::adapters::{DefinitionRegistry, RestTransport};
use crate::config;
use crate::core::{self, Tree};
use crate::domain::asset::STRUCTURED_DATA;
use crate::domain::{AssetRef, ContentType, DataDefinition, Identifier, Node};
use crate::host::{Client, Content};
use crate::wire::{self, WireShape};

/// sdtree - Structured data trees for content objects
#[derive(Parser, Debug)]
#[command(name = "sdtree")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Payload and definition shared by offline commands
#[derive(clap::Args, Debug)]
pub struct PayloadArgs {
    /// Structured-data payload (JSON)
    pub payload: PathBuf,

    /// Definition file (YAML or JSON)
    #[arg(short, long)]
    pub definition: PathBuf,
}

/// Where and how to write a rewritten payload
#[derive(clap::Args, Debug)]
pub struct OutputArgs {
    /// Output shape (defaults to the configured shape)
    #[arg(long, value_enum)]
    pub shape: Option<ShapeArg>,

    /// Output file (stdout if not provided)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List node identifiers (of the payload, or of the definition alone)
    Ids {
        /// Structured-data payload (JSON)
        payload: Option<PathBuf>,

        /// Definition file (YAML or JSON)
        #[arg(short, long)]
        definition: PathBuf,
    },

    /// Report nodes and values the definition no longer allows
    Phantoms {
        #[command(flatten)]
        input: PayloadArgs,
    },

    /// Remove phantom nodes (and optionally phantom values)
    Prune {
        #[command(flatten)]
        input: PayloadArgs,

        /// Also clear phantom values
        #[arg(long)]
        values: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Find text nodes containing a string or matching a pattern
    Search {
        #[command(flatten)]
        input: PayloadArgs,

        /// Text to look for
        needle: String,

        /// Treat the needle as a regular expression
        #[arg(long)]
        regex: bool,

        /// Limit the search to these identifiers (repeatable)
        #[arg(long)]
        scope: Vec<String>,
    },

    /// Replace text in text nodes
    Replace {
        #[command(flatten)]
        input: PayloadArgs,

        /// Text to replace
        needle: String,

        /// Replacement (may use $1 captures with --regex)
        replacement: String,

        /// Treat the needle as a regular expression
        #[arg(long)]
        regex: bool,

        /// Limit the replacement to these identifiers (repeatable)
        #[arg(long)]
        scope: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Re-encode a payload in another wire shape
    Convert {
        #[command(flatten)]
        input: PayloadArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Set the number of instances of a repeatable field
    Resize {
        #[command(flatten)]
        input: PayloadArgs,

        /// Identifier of the field (e.g. "items#0")
        identifier: String,

        /// Number of instances
        count: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fetch a content object's structured data from the service
    Fetch {
        /// Asset as type:id (e.g. page:abc123)
        asset: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Reconcile a content object with its current definition
    Reconcile {
        /// Asset as type:id (e.g. block:abc123)
        asset: String,

        /// Commit the reconciled tree (report only otherwise)
        #[arg(long)]
        commit: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Wire shape as a CLI argument
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ShapeArg {
    /// Single-entry node lists collapse to a bare object
    ObjectOrArray,
    /// Node lists are always arrays
    ArrayOnly,
}

impl From<ShapeArg> for WireShape {
    fn from(shape: ShapeArg) -> Self {
        match shape {
            ShapeArg::ObjectOrArray => WireShape::ObjectOrArray,
            ShapeArg::ArrayOnly => WireShape::ArrayOnly,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Ids {
                payload,
                definition,
            } => list_ids(payload.as_deref(), &definition),
            Commands::Phantoms { input } => show_phantoms(&input),
            Commands::Prune {
                input,
                values,
                output,
            } => prune(&input, values, &output),
            Commands::Search {
                input,
                needle,
                regex,
                scope,
            } => search(&input, &needle, regex, &scope),
            Commands::Replace {
                input,
                needle,
                replacement,
                regex,
                scope,
                output,
            } => replace(&input, &needle, &replacement, regex, &scope, &output),
            Commands::Convert { input, output } => {
                let (tree, _) = load(&input)?;
                write_tree(&tree, &output)
            }
            Commands::Resize {
                input,
                identifier,
                count,
                output,
            } => resize(&input, &identifier, count, &output),
            Commands::Fetch { asset, output } => fetch(&asset, &output).await,
            Commands::Reconcile { asset, commit } => reconcile_remote(&asset, commit).await,
            Commands::Config => show_config(),
        }
    }
}

fn load_definition(path: &Path) -> Result<Arc<DataDefinition>> {
    let definition = DataDefinition::from_file(path)
        .with_context(|| format!("Failed to load definition: {}", path.display()))?;
    Ok(Arc::new(definition))
}

/// Decode a payload file; an asset record's `structuredData` is unwrapped
fn load(input: &PayloadArgs) -> Result<(Tree, Arc<DataDefinition>)> {
    let definition = load_definition(&input.definition)?;
    let content = std::fs::read_to_string(&input.payload)
        .with_context(|| format!("Failed to read payload: {}", input.payload.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Payload is not JSON: {}", input.payload.display()))?;
    let payload = value.get(STRUCTURED_DATA).unwrap_or(&value);

    let tree = wire::decode(payload, &definition)
        .with_context(|| format!("Failed to decode payload: {}", input.payload.display()))?;
    Ok((tree, definition))
}

fn parse_identifier(text: &str) -> Result<Identifier> {
    Identifier::parse(text).with_context(|| format!("Invalid identifier: {}", text))
}

fn parse_scope(scope: &[String]) -> Result<Option<HashSet<Identifier>>> {
    if scope.is_empty() {
        return Ok(None);
    }
    scope.iter().map(|s| parse_identifier(s)).collect::<Result<_>>().map(Some)
}

fn parse_asset(text: &str) -> Result<AssetRef> {
    let (kind, id) = text
        .split_once(':')
        .with_context(|| format!("Expected type:id, got '{}'", text))?;
    let kind: ContentType = kind.parse().map_err(anyhow::Error::msg)?;
    Ok(AssetRef::new(kind, id))
}

fn output_shape(output: &OutputArgs) -> Result<WireShape> {
    match output.shape {
        Some(shape) => Ok(shape.into()),
        None => Ok(config::config()?.service.shape),
    }
}

fn write_json(value: &Value, output: &OutputArgs) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match &output.output {
        Some(path) => std::fs::write(path, text + "\n")
            .with_context(|| format!("Failed to write output: {}", path.display())),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

fn write_tree(tree: &Tree, output: &OutputArgs) -> Result<()> {
    write_json(&wire::encode(tree, output_shape(output)?), output)
}

fn describe(node: &Node) -> String {
    match node {
        Node::Group(_) => "group".to_string(),
        Node::Text(text) => format!("text  {:?}", text.value()),
        Node::Reference(reference) => match (reference.target_id(), reference.target_path()) {
            (Some(id), _) => format!("asset {}", id),
            (None, Some(path)) => format!("asset {}", path),
            (None, None) => "asset (none)".to_string(),
        },
    }
}

fn list_ids(payload: Option<&Path>, definition_path: &Path) -> Result<()> {
    match payload {
        Some(payload) => {
            let (tree, _) = load(&PayloadArgs {
                payload: payload.to_path_buf(),
                definition: definition_path.to_path_buf(),
            })?;
            for (id, node) in tree.nodes() {
                println!("{:<40} {}", id, describe(node));
            }
        }
        None => {
            let definition = load_definition(definition_path)?;
            for id in definition.identifiers() {
                println!("{}", id);
            }
        }
    }
    Ok(())
}

fn show_phantoms(input: &PayloadArgs) -> Result<()> {
    let (tree, definition) = load(input)?;
    let nodes = core::find_phantom_nodes(&tree, &definition);
    let values = core::find_phantom_values(&tree, &definition);

    if nodes.is_empty() && values.is_empty() {
        println!("No phantoms found");
        return Ok(());
    }
    for id in &nodes {
        println!("node   {}", id);
    }
    for id in &values {
        println!("value  {}", id);
    }
    eprintln!("\n{} phantom node(s), {} phantom value(s)", nodes.len(), values.len());
    Ok(())
}

fn prune(input: &PayloadArgs, values: bool, output: &OutputArgs) -> Result<()> {
    let (tree, definition) = load(input)?;
    let pruned = if values {
        core::reconcile(&tree, &definition)
    } else {
        core::prune_phantom_nodes(&tree, &definition)
    };
    write_tree(&pruned, output)
}

fn search(input: &PayloadArgs, needle: &str, regex: bool, scope: &[String]) -> Result<()> {
    let (tree, _) = load(input)?;
    let scope = parse_scope(scope)?;

    let hits = if regex {
        let pattern = Regex::new(needle).with_context(|| format!("Invalid pattern: {}", needle))?;
        core::search_pattern(&tree, &pattern, scope.as_ref())
    } else {
        core::search_literal(&tree, needle, scope.as_ref())
    };

    for id in &hits {
        println!("{:<40} {:?}", id, tree.text_value(id)?);
    }
    eprintln!("\n{} match(es)", hits.len());
    Ok(())
}

fn replace(
    input: &PayloadArgs,
    needle: &str,
    replacement: &str,
    regex: bool,
    scope: &[String],
    output: &OutputArgs,
) -> Result<()> {
    let (tree, _) = load(input)?;
    let scope = parse_scope(scope)?;

    let replaced = if regex {
        let pattern = Regex::new(needle).with_context(|| format!("Invalid pattern: {}", needle))?;
        core::replace_pattern(&tree, &pattern, replacement, scope.as_ref())
    } else {
        core::replace_literal(&tree, needle, replacement, scope.as_ref())
    };
    write_tree(&replaced, output)
}

fn resize(input: &PayloadArgs, identifier: &str, count: usize, output: &OutputArgs) -> Result<()> {
    let (mut tree, _) = load(input)?;
    let identifier = parse_identifier(identifier)?;
    tree.resize_to(&identifier, count)
        .with_context(|| format!("Failed to resize {}", identifier))?;
    write_tree(&tree, output)
}

/// Client for the configured service, with definitions from the configured directory
fn service_client() -> Result<Client> {
    let cfg = config::config()?;
    let transport = Arc::new(
        RestTransport::from_settings(&cfg.service).context("Failed to create REST transport")?,
    );
    let definitions = DefinitionRegistry::load_dir(&cfg.definitions_dir).with_context(|| {
        format!(
            "Failed to load definitions from {}",
            cfg.definitions_dir.display()
        )
    })?;
    Ok(Client::new(transport.clone(), Arc::new(definitions)).with_resolver(transport))
}

async fn fetch(asset: &str, output: &OutputArgs) -> Result<()> {
    let asset = parse_asset(asset)?;
    let client = service_client()?;
    let handle = client.open(&asset).await?;

    match handle.content() {
        Content::Structured(tree) => write_tree(tree, output),
        Content::Xhtml(xhtml) => {
            println!("{}", xhtml);
            Ok(())
        }
    }
}

async fn reconcile_remote(asset: &str, commit: bool) -> Result<()> {
    let asset = parse_asset(asset)?;
    let client = service_client()?;
    let mut handle = client.open(&asset).await?;

    let report = client.reconcile(&mut handle).await?;
    for id in &report.phantom_nodes {
        println!("node   {}", id);
    }
    for id in &report.phantom_values {
        println!("value  {}", id);
    }

    if report.is_clean() {
        eprintln!("{} is clean", asset);
    } else if commit {
        client.commit(&mut handle).await?;
        eprintln!("Committed reconciled content for {}", asset);
    } else {
        eprintln!("Dry run; pass --commit to write the reconciled content");
    }
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Service:");
    println!("  Base URL: {}", cfg.service.base_url);
    println!(
        "  API key:  {}",
        if cfg.service.api_key.is_some() { "(set)" } else { "(none)" }
    );
    println!("  Timeout:  {}s", cfg.service.timeout_seconds);
    println!("  Shape:    {:?}", cfg.service.shape);
    println!();
    println!("Definitions: {}", cfg.definitions_dir.display());

    Ok(())
}
