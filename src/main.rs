use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use docbase::{
    CorpusConfig, Definition, DocumentContext, Error, Expr, MessageLog,
    Result, Row, Settings, Severity, Value, Vault, ViewCache,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{BaseArgs, Cli, Command, CorpusArgs, EvalArgs, ViewArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCBASE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(ExitCode::SUCCESS);
    }

    let settings = Settings::resolve(cli.config.as_deref())?;
    let log = Arc::new(MessageLog::new());

    let result = match &cli.command {
        Command::View(args) => cmd_view(&settings, &log, args),
        Command::Views(args) => cmd_views(&settings, &log, args),
        Command::Check(args) => cmd_check(&settings, &log, args),
        Command::Eval(args) => cmd_eval(&settings, &log, args),
        Command::Corpora => {
            cmd_corpora(&settings);
            Ok(ExitCode::SUCCESS)
        }
        Command::Completions(_) => Ok(ExitCode::SUCCESS),
    };

    print_messages(&log);
    result
}

/// Open the corpus selected on the command line.
///
/// `--root` wins; otherwise the named corpus, or the only configured one.
fn open_vault(
    settings: &Settings,
    log: &Arc<MessageLog>,
    args: &CorpusArgs,
) -> Result<Arc<Vault>> {
    let (name, config) = if let Some(root) = &args.root {
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "corpus root is not a directory: {}",
                root.display()
            )));
        }
        let name = root
            .canonicalize()?
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string());
        (name, CorpusConfig::at(root))
    } else if let Some(name) = &args.corpus {
        (name.clone(), settings.corpus(name)?.clone())
    } else {
        let mut corpora = settings.corpora.iter();
        match (corpora.next(), corpora.next()) {
            (Some((name, config)), None) => (name.clone(), config.clone()),
            _ => {
                return Err(Error::Config(
                    "select a corpus with --corpus NAME or --root DIR"
                        .to_string(),
                ));
            }
        }
    };

    tracing::debug!(
        corpus = %name,
        root = %config.path.display(),
        "opening corpus"
    );
    Ok(Arc::new(Vault::open(name, config, log.clone())?))
}

fn cmd_view(
    settings: &Settings,
    log: &Arc<MessageLog>,
    args: &ViewArgs,
) -> Result<ExitCode> {
    let vault = open_vault(settings, log, &args.corpus)?;
    let base = Definition::load(vault, &args.base)?;
    let name = match &args.view {
        Some(name) => name.clone(),
        None => base
            .views()
            .first()
            .map(|view| view.name.clone())
            .ok_or_else(|| Error::NotFound {
                kind: "view",
                name: format!("any view in {}", args.base),
            })?,
    };

    let cache = ViewCache::new(Arc::new(settings.clone()));
    let rows = base.materialize(&name, &cache, args.refresh)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(rows.as_slice())?);
    } else {
        print_table(rows.as_slice());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_table(rows: &[Row]) {
    let Some(first) = rows.first() else {
        println!("No rows.");
        return;
    };
    println!("{}", first.keys().collect::<Vec<_>>().join("\t"));
    for row in rows {
        let cells: Vec<String> =
            row.iter().map(|(_, v)| cell_text(v)).collect();
        println!("{}", cells.join("\t"));
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Float(f) if f.is_nan() => String::new(),
        other => other.to_string(),
    }
}

fn cmd_views(
    settings: &Settings,
    log: &Arc<MessageLog>,
    args: &BaseArgs,
) -> Result<ExitCode> {
    let vault = open_vault(settings, log, &args.corpus)?;
    let base = Definition::load(vault, &args.base)?;
    if base.views().is_empty() {
        println!("No views defined.");
    }
    for view in base.views() {
        println!("{}\t{}", view.name, view.kind);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(
    settings: &Settings,
    log: &Arc<MessageLog>,
    args: &BaseArgs,
) -> Result<ExitCode> {
    let vault = open_vault(settings, log, &args.corpus)?;
    let base = Definition::load(Arc::clone(&vault), &args.base)?;

    let filters = std::iter::once(("filters", base.filter()))
        .chain(base.views().iter().map(|v| (v.name.as_str(), &v.filter)));
    for (owner, filter) in filters {
        for err in filter.compile_errors() {
            vault.notify(
                Severity::Error,
                format!("filter in {owner} does not compile"),
                err.to_string(),
            );
        }
    }

    let failed = log
        .snapshot()
        .iter()
        .any(|m| m.severity >= Severity::Warning);
    println!(
        "{}: {} views, {} formulas{}",
        base.path(),
        base.views().len(),
        base.formulas().len(),
        if failed { ", with problems" } else { "" }
    );
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_eval(
    settings: &Settings,
    log: &Arc<MessageLog>,
    args: &EvalArgs,
) -> Result<ExitCode> {
    let expr = Expr::compile(&args.expr)?;
    let vault = open_vault(settings, log, &args.corpus)?;

    let mut failures = 0usize;
    let mut results = Vec::new();
    for path in vault.index().list_documents()? {
        let doc = DocumentContext::new(Arc::clone(&vault), path)?;
        let shown = doc.display_path();
        match expr.evaluate(&doc) {
            Ok(value) if args.json => {
                results.push(json!({"path": shown, "value": value}));
            }
            Ok(value) => println!("{shown}\t{}", cell_text(&value)),
            Err(err) => {
                failures += 1;
                if args.json {
                    results.push(
                        json!({"path": shown, "error": err.to_string()}),
                    );
                } else {
                    println!("{shown}\terror: {err}");
                }
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    tracing::debug!(failures, "evaluated expression");
    Ok(ExitCode::SUCCESS)
}

fn cmd_corpora(settings: &Settings) {
    if settings.corpora.is_empty() {
        println!("No corpora configured.");
        return;
    }
    for (name, config) in &settings.corpora {
        println!("{name}\t{}", config.path.display());
    }
}

fn print_messages(log: &MessageLog) {
    for message in log.drain() {
        eprintln!("{}: {}", message.severity, message.text);
        for line in message.details.lines() {
            eprintln!("  {line}");
        }
    }
}
