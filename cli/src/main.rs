use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::Context;
use clap::{Parser, Subcommand};
use vex_core::{Interp, InterpConfig, StandaloneHost};

mod repl;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "vex::func=debug,vex::heap=debug,vex::exec=info";

#[derive(Debug, Parser)]
#[command(
    name = "vex",
    author,
    version,
    about = "Run editor scripts without an editor",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Script to source; without one an interactive prompt starts
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: Option<PathBuf>,

    /// TOML file with interpreter limits
    #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path, global = true)]
    config: Option<PathBuf>,

    /// Directory searched for `name#func` autoload scripts
    #[arg(long, value_name = "DIR", value_parser = parse_sanitized_path, global = true)]
    autoload_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Evaluate one expression and print the result.
    Eval {
        #[arg(value_name = "EXPR")]
        expr: String,
    },
}

fn read_file_content(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file '{}'", path.display()))
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `VEX_TRACE=1` logs with the default filter (or `RUST_LOG`); any other
/// value is used as the filter itself.
fn maybe_init_tracing() {
    let raw = match std::env::var("VEX_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<InterpConfig> {
    let Some(path) = path else {
        return Ok(InterpConfig::default());
    };
    let text = read_file_content(path)?;
    toml::from_str(&text).with_context(|| format!("Invalid config file '{}'", path.display()))
}

/// Interpreter on a stand-alone host with every stdlib module registered.
pub(crate) fn build_interp(config: InterpConfig, autoload_dir: Option<&Path>) -> anyhow::Result<Interp> {
    let mut host = StandaloneHost::new(&config);
    if let Some(dir) = autoload_dir {
        host = host.with_autoload_dir(dir);
    }
    let mut interp = Interp::new(Box::new(host), config)?;
    vex_stdlib::register_stdlib_modules(&mut interp)?;
    Ok(interp)
}

fn run_file(interp: &mut Interp, path: &Path) -> anyhow::Result<bool> {
    let src = read_file_content(path)?;
    // Errors were already shown by the host; only the exit status is left.
    let ok = interp.source_str(&src).is_ok();
    interp.collect_garbage();
    interp.host_mut().flush();
    Ok(ok && interp.error_count() == 0)
}

fn run_eval(interp: &mut Interp, expr: &str) -> bool {
    match interp.eval_to_value(expr) {
        Ok(value) => {
            let text = interp.display(&value);
            interp.heap.release(value);
            println!("{text}");
            interp.error_count() == 0
        }
        Err(err) => {
            eprintln!("Error: {err}");
            false
        }
    }
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();
    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;
    let mut interp = build_interp(config, args.autoload_dir.as_deref())?;

    let ok = match (&args.command, &args.file) {
        (Some(Commands::Eval { expr }), _) => run_eval(&mut interp, expr),
        (None, Some(path)) => run_file(&mut interp, path)?,
        (None, None) => {
            repl::run(&mut interp)?;
            true
        }
    };
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
