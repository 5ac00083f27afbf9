use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docbase",
    about = "Query markdown corpora through YAML base definitions"
)]
pub struct Cli {
    /// Settings file (defaults to $DOCBASE_CONFIG or the XDG config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Materialize a view of a base definition
    View(ViewArgs),
    /// List the views of a base definition
    Views(BaseArgs),
    /// Parse a base definition and report problems
    Check(BaseArgs),
    /// Evaluate an expression against every document
    Eval(EvalArgs),
    /// List configured corpora
    Corpora,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

/// Which corpus to work on.
#[derive(Debug, Clone, Args)]
pub struct CorpusArgs {
    /// Name of a configured corpus
    #[arg(short = 'c', long, conflicts_with = "root")]
    pub corpus: Option<String>,

    /// Use this directory as an ad-hoc corpus
    #[arg(long)]
    pub root: Option<PathBuf>,
}

// -- Definitions --

#[derive(Debug, Parser)]
pub struct BaseArgs {
    /// Definition path, relative to the corpus root
    pub base: String,

    #[command(flatten)]
    pub corpus: CorpusArgs,
}

#[derive(Debug, Parser)]
pub struct ViewArgs {
    /// Definition path, relative to the corpus root
    pub base: String,

    /// View name (defaults to the first view)
    pub view: Option<String>,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Output rows as a JSON array
    #[arg(long)]
    pub json: bool,

    /// Ignore cached rows
    #[arg(long)]
    pub refresh: bool,
}

// -- Eval --

#[derive(Debug, Parser)]
pub struct EvalArgs {
    /// Expression, e.g. 'file.tags.contains("todo")'
    pub expr: String,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docbase",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_view_defaults() {
        let cli = Cli::parse_from(["docbase", "view", "all.base"]);
        match cli.command {
            Command::View(args) => {
                assert_eq!(args.base, "all.base");
                assert!(args.view.is_none());
                assert!(args.corpus.corpus.is_none());
                assert!(!args.json);
                assert!(!args.refresh);
            }
            _ => panic!("expected view command"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "docbase", "eval", "1 + 1", "--root", "/tmp/x", "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Eval(args) => {
                assert_eq!(args.expr, "1 + 1");
                assert_eq!(args.corpus.root, Some(PathBuf::from("/tmp/x")));
            }
            _ => panic!("expected eval command"),
        }
    }

    #[test]
    fn corpus_and_root_conflict() {
        let parsed = Cli::try_parse_from([
            "docbase", "views", "a.base", "--corpus", "n", "--root", "/tmp",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
