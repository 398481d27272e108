//! strata CLI - hierarchical configuration lookups.
//!
//! # Scope variables
//!
//! The interpolation scope is assembled from (later wins):
//!
//! 1. `--vars <file>` / `--facts <file>`: YAML or JSON key-value files
//! 2. `--var key=value`: literals, values parsed as YAML
//!
//! # Output
//!
//! Values render as YAML by default; `--render-as s|json|yaml|binary`
//! selects another format. With `--explain`/`--explain-options` the
//! trace replaces the value output. Errors print as a single line on
//! stderr and exit non-zero.

mod render;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use strata_runtime::convert::convert_to;
use strata_runtime::explain::Explainer;
use strata_runtime::merge::MergeStrategy;
use strata_runtime::{CallOptions, Session};
use strata_types::{Key, Map, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// strata - perform lookups across a layered data hierarchy
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
struct Args {
    /// Keys to look up
    #[arg(required = true)]
    keys: Vec<String>,

    /// Path to the hierarchy config file. Overrides <current directory>/hiera.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Merge strategy: first/unique/hash/deep
    #[arg(long, default_value = "first")]
    merge: String,

    /// A value to return when no data source provides one
    #[arg(long)]
    default: Option<String>,

    /// Coerce the result to the named type
    #[arg(long = "type")]
    type_name: Option<String>,

    /// s/json/yaml/binary: output format of the results
    #[arg(long = "render-as")]
    render_as: Option<String>,

    /// Explain the details of how the lookup was performed
    #[arg(long)]
    explain: bool,

    /// Explain how the lookup_options hash affecting this lookup was assembled
    #[arg(long)]
    explain_options: bool,

    /// Path to a YAML or JSON file with variables for the interpolation scope
    #[arg(long = "vars")]
    var_paths: Vec<PathBuf>,

    /// Alias for --vars
    #[arg(long)]
    facts: Vec<PathBuf>,

    /// A key=value or key:value literal scope variable (value parsed as YAML)
    #[arg(long = "var")]
    variables: Vec<String>,

    /// Log level: error/warn/info/debug
    #[arg(long, default_value = "error")]
    loglevel: String,
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.loglevel.clone()));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let scope = build_scope(args)?;
    let mut builder = Session::builder().with_scope(scope);
    if let Some(config) = &args.config {
        builder = builder.with_config_path(config);
    }
    let session = builder.build();

    let mut stdout = std::io::stdout().lock();
    let result = lookup_and_render(&session, args, &mut stdout);
    session.shutdown();
    result
}

fn lookup_and_render(session: &Session, args: &Args, out: &mut impl Write) -> Result<()> {
    let call = CallOptions {
        merge: Some(MergeStrategy::from_name(&args.merge)?),
    };
    let default = args.default.as_deref().map(parse_default).transpose()?;
    let explaining = args.explain || args.explain_options;

    for key in &args.keys {
        let key = Key::parse(key)?;
        let explainer =
            explaining.then(|| Explainer::new(args.explain, args.explain_options));
        let mut invocation = session.invocation(None, explainer);
        let value = invocation.lookup(&key, default.as_ref(), &call)?;

        if explaining {
            if let Some(explainer) = invocation.take_explainer() {
                out.write_all(explainer.render_text().as_bytes())?;
            }
            continue;
        }

        let Some(value) = value else {
            continue;
        };
        let value = match &args.type_name {
            Some(type_name) => convert_to(value, type_name)?,
            None => value,
        };
        render::render(&value, args.render_as.as_deref().unwrap_or("yaml"), out)?;
    }
    Ok(())
}

/// The default is a YAML scalar or flow value; an empty argument is the
/// empty string, not null.
fn parse_default(text: &str) -> Result<Value> {
    if text.is_empty() {
        return Ok(Value::from(""));
    }
    strata_runtime::yaml::parse_str(text)
        .with_context(|| format!("invalid default value '{text}'"))
}

fn build_scope(args: &Args) -> Result<Map> {
    let mut scope = Map::new();
    for path in args.var_paths.iter().chain(&args.facts) {
        let vars = load_vars_file(path)?;
        scope.extend(vars);
    }
    for spec in &args.variables {
        let (name, value) = parse_var(spec)?;
        scope.insert(name, value);
    }
    Ok(scope)
}

fn load_vars_file(path: &Path) -> Result<Map> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read vars file '{}'", path.display()))?;
    let value = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse vars file '{}'", path.display()))?
    } else {
        strata_runtime::yaml::parse_str(&text)
            .with_context(|| format!("failed to parse vars file '{}'", path.display()))?
    };
    match value {
        Value::Map(m) => Ok(m),
        Value::Null => Ok(Map::new()),
        other => bail!(
            "vars file '{}' must contain a map, got {}",
            path.display(),
            other.kind()
        ),
    }
}

/// Splits `key=value` or `key: value` at the first separator; the value
/// is parsed as YAML so flow maps and arrays work.
fn parse_var(spec: &str) -> Result<(String, Value)> {
    let eq = spec.find('=');
    let colon = spec.find(':');
    let split = match (eq, colon) {
        (Some(e), Some(c)) => e.min(c),
        (Some(e), None) => e,
        (None, Some(c)) => c,
        (None, None) => bail!("variable '{spec}' must be key=value or key:value"),
    };
    let name = spec[..split].trim();
    if name.is_empty() {
        bail!("variable '{spec}' has an empty name");
    }
    let value_text = spec[split + 1..].trim();
    let value = if value_text.is_empty() {
        Value::from("")
    } else {
        strata_runtime::yaml::parse_str(value_text)
            .with_context(|| format!("invalid value in variable '{spec}'"))?
    };
    Ok((name.to_owned(), value))
}
