//! CLI argument definitions

use crate::ParseOptions;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse nginx configuration and inspect what the analyzer sees
#[derive(Parser)]
#[command(name = "ngx-audit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress warnings
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the configuration as the parser reconstructed it
    Dump(DumpArgs),

    /// Print the node tree with kinds, lines and provided variables
    Inspect(InspectArgs),

    /// Print strings a regular expression can match
    Generate(GenerateArgs),
}

/// Options shared by the commands that parse a configuration
#[derive(clap::Args)]
pub struct ParseArgs {
    /// Configuration file, or an `nginx -T` dump
    #[arg(required = true)]
    pub input: PathBuf,

    /// Base directory for relative includes (default: the file's directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Do not follow include directives
    #[arg(long)]
    pub no_includes: bool,

    /// Maximum include depth
    #[arg(long, default_value = "10")]
    pub max_include_depth: usize,
}

impl ParseArgs {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            cwd: self.cwd.clone().unwrap_or_default(),
            allow_includes: !self.no_includes,
            max_include_depth: self.max_include_depth,
        }
    }
}

#[derive(clap::Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub parse: ParseArgs,

    /// Add a `# file:line` comment above every block
    #[arg(long)]
    pub source_refs: bool,
}

#[derive(clap::Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub parse: ParseArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct GenerateArgs {
    /// PCRE pattern
    pub pattern: String,

    /// Character printed for classes, `.` and backreferences
    #[arg(long, default_value = "`")]
    pub placeholder: char,

    /// Repetitions of unbounded quantifiers
    #[arg(long, default_value = "5")]
    pub max_repeat: u32,

    /// Keep `^` and `$` anchors in the output
    #[arg(long)]
    pub anchored: bool,

    /// Match case-insensitively
    #[arg(short, long)]
    pub ignore_case: bool,

    /// Stop after this many strings
    #[arg(long, default_value = "100")]
    pub limit: usize,
}

#[derive(ValueEnum, Clone, Copy, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_map_to_options() {
        let cli = Cli::parse_from([
            "ngx-audit",
            "inspect",
            "nginx.conf",
            "--no-includes",
            "--max-include-depth",
            "3",
            "--cwd",
            "/etc/nginx",
            "--json",
        ]);
        let Commands::Inspect(args) = cli.command else {
            panic!("expected inspect");
        };
        let options = args.parse.parse_options();
        assert!(!options.allow_includes);
        assert_eq!(options.max_include_depth, 3);
        assert_eq!(options.cwd, PathBuf::from("/etc/nginx"));
        assert!(args.json);
    }

    #[test]
    fn test_generate_defaults() {
        let cli = Cli::parse_from(["ngx-audit", "-vv", "generate", "^/a(b|c)"]);
        assert_eq!(cli.verbose, 2);
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.placeholder, '`');
        assert_eq!(args.max_repeat, 5);
        assert_eq!(args.limit, 100);
        assert!(!args.anchored);
    }
}
