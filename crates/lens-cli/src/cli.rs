use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lens",
    about = "Lens: metadata extraction and indexing for content-addressed objects",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Metadata index directory (overrides the config file)
    #[arg(long, global = true)]
    pub datastore: Option<PathBuf>,

    /// Block store directory (overrides the config file)
    #[arg(long, global = true)]
    pub blocks: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract metadata for identifiers and store it
    Extract(ExtractArgs),
    /// Show the stored metadata for an identifier
    Lookup(LookupArgs),
    /// List every indexed identifier
    List(ListArgs),
    /// Remove an identifier's metadata from the index
    Delete(DeleteArgs),
    /// Migrate the index into a new store directory
    Migrate(MigrateArgs),
    /// Add a file to the block store and print its identifier
    Import(ImportArgs),
    /// Rewrite the index log keeping only live entries
    Compact(CompactArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(required = true)]
    pub cids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LookupArgs {
    pub cid: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub cid: String,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Destination store directory
    #[arg(long)]
    pub to: PathBuf,
    /// Stop at the first failing entry
    #[arg(long)]
    pub abort_on_error: bool,
    /// Re-resolve entries without writing the destination
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,
    #[arg(long, default_value = "raw")]
    pub codec: ImportCodec,
    /// Chunk the file into a UnixFS DAG instead of a single block
    #[arg(long, conflicts_with = "codec")]
    pub unixfs: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ImportCodec {
    Raw,
    DagJson,
    DagCbor,
}

#[derive(Args, Debug)]
pub struct CompactArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_requires_an_identifier() {
        assert!(Cli::try_parse_from(["lens", "extract"]).is_err());
        let cli = Cli::try_parse_from(["lens", "extract", "bafyone", "bafytwo"]).unwrap();
        match cli.command {
            Command::Extract(args) => assert_eq!(args.cids, vec!["bafyone", "bafytwo"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "lens", "lookup", "bafyone", "--format", "json", "-v", "--datastore", "/tmp/idx",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
        assert_eq!(cli.datastore, Some(PathBuf::from("/tmp/idx")));
        assert!(cli.config.is_none());
    }

    #[test]
    fn migrate_flags() {
        let cli = Cli::try_parse_from(["lens", "migrate", "--to", "next", "--abort-on-error"]).unwrap();
        match cli.command {
            Command::Migrate(args) => {
                assert_eq!(args.to, PathBuf::from("next"));
                assert!(args.abort_on_error);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["lens", "migrate"]).is_err());
    }

    #[test]
    fn import_codec_values() {
        let cli = Cli::try_parse_from(["lens", "import", "a.json", "--codec", "dag-json"]).unwrap();
        match cli.command {
            Command::Import(args) => {
                assert_eq!(args.codec, ImportCodec::DagJson);
                assert!(!args.unixfs);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["lens", "import", "a.bin", "--codec", "sha"]).is_err());
    }
}
