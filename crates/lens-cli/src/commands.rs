use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use lens_index::{MetadataIndex, MetadataStore};
use lens_migrate::{MigrationEngine, MigrationError};
use lens_resolver::unixfs::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS};
use lens_resolver::{build_file, FsContentStore};
use lens_sdk::{Lens, LensConfig, PlaceholderClassifier};
use lens_types::{Codec, ContentIdentifier, HashFunction, MetadataRecord, MigrationReport, MigrationStatus};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = resolve_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Extract(args) => cmd_extract(&config, format, args).await,
        Command::Lookup(args) => cmd_lookup(&config, format, args),
        Command::List(args) => cmd_list(&config, format, args),
        Command::Delete(args) => cmd_delete(&config, format, args),
        Command::Migrate(args) => cmd_migrate(&config, format, args).await,
        Command::Import(args) => cmd_import(&config, format, args),
        Command::Compact(_) => cmd_compact(&config, format),
    }
}

/// Flags override the config file, which overrides the defaults.
fn resolve_config(cli: &Cli) -> anyhow::Result<LensConfig> {
    let mut config = LensConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.datastore {
        config.datastore_path = path.clone();
    }
    if let Some(path) = &cli.blocks {
        config.blocks_path = path.clone();
    }
    Ok(config)
}

fn parse_cid(text: &str) -> anyhow::Result<ContentIdentifier> {
    ContentIdentifier::parse(text).with_context(|| format!("invalid identifier {text:?}"))
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling in-flight work");
            trigger.cancel();
        }
    });
    cancel
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn cmd_extract(config: &LensConfig, format: OutputFormat, args: ExtractArgs) -> anyhow::Result<ExitCode> {
    let ids = args
        .cids
        .iter()
        .map(|c| parse_cid(c))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let lens = Lens::open(config, Arc::new(PlaceholderClassifier::new()))?;
    let outcomes = lens.extract_batch(ids, &interrupt_token()).await;
    lens.close()?;

    let all_ok = outcomes.iter().all(|o| o.result.is_ok());
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(done) => json!({
                        "cid": o.id.to_canonical(),
                        "label": done.label.as_str(),
                        "key": done.key.as_str(),
                    }),
                    Err(e) => json!({
                        "cid": o.id.to_canonical(),
                        "error": e.kind().as_str(),
                        "detail": e.to_string(),
                        "retryable": e.is_retryable(),
                    }),
                })
                .collect();
            print_json(&serde_json::Value::Array(rows))?;
        }
        OutputFormat::Text => {
            for o in &outcomes {
                match &o.result {
                    Ok(done) => println!(
                        "{} {}  {}  {}",
                        "✓".green().bold(),
                        o.id.to_string().yellow(),
                        done.label.as_str().cyan(),
                        done.key.as_str().dimmed()
                    ),
                    Err(e) => println!(
                        "{} {}  {}: {}",
                        "✗".red().bold(),
                        o.id.to_string().yellow(),
                        e.kind().as_str().red(),
                        e
                    ),
                }
            }
        }
    }
    Ok(exit_status(all_ok))
}

fn print_record(record: &MetadataRecord) {
    println!("{} {}", "cid:".bold(), record.source().to_string().yellow());
    println!("{} {}", "type:".bold(), record.content_type().as_str().cyan());
    println!("{} {}", "extracted:".bold(), record.extracted_at().to_rfc3339());
    for (name, value) in record.fields() {
        println!("  {}: {}", name.bold(), value.to_json());
    }
}

fn cmd_lookup(config: &LensConfig, format: OutputFormat, args: LookupArgs) -> anyhow::Result<ExitCode> {
    let id = parse_cid(&args.cid)?;
    let store = MetadataStore::open(&config.datastore_path)?;
    let record = store.get(&id)?;
    match format {
        OutputFormat::Json => print_json(&record.to_json())?,
        OutputFormat::Text => print_record(&record),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_list(config: &LensConfig, format: OutputFormat, args: ListArgs) -> anyhow::Result<ExitCode> {
    let store = MetadataStore::open(&config.datastore_path)?;
    let limit = args.limit.unwrap_or(usize::MAX);
    let mut rows = Vec::new();
    for entry in store.iterate().take(limit) {
        let entry = entry?;
        match format {
            OutputFormat::Json => rows.push(json!({
                "cid": entry.key.to_canonical(),
                "label": entry.record.content_type().as_str(),
                "fields": entry.record.fields().len(),
            })),
            OutputFormat::Text => println!(
                "{}  {}  ({} fields)",
                entry.key.to_string().yellow(),
                entry.record.content_type().as_str().cyan(),
                entry.record.fields().len()
            ),
        }
    }
    match format {
        OutputFormat::Json => print_json(&serde_json::Value::Array(rows))?,
        OutputFormat::Text if store.is_empty() => println!("Index is empty."),
        OutputFormat::Text => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_delete(config: &LensConfig, format: OutputFormat, args: DeleteArgs) -> anyhow::Result<ExitCode> {
    let id = parse_cid(&args.cid)?;
    let store = MetadataStore::open(&config.datastore_path)?;
    store.delete(&id)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "deleted": id.to_canonical() }))?,
        OutputFormat::Text => println!("{} Deleted {}", "✓".green().bold(), id.to_string().yellow()),
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &MigrationReport, dry_run: bool) {
    for result in &report.results {
        let (mark, status) = match result.status {
            MigrationStatus::Migrated => ("✓".green(), "migrated".green()),
            MigrationStatus::Skipped => ("·".dimmed(), "verified".dimmed()),
            MigrationStatus::Failed => ("✗".red(), "failed".red()),
        };
        match &result.error_detail {
            Some(detail) => println!("{mark} {}  {status}: {detail}", result.key.to_string().yellow()),
            None => println!("{mark} {}  {status}", result.key.to_string().yellow()),
        }
    }
    let mode = if dry_run { " (dry run)" } else { "" };
    println!(
        "\n{} entries{mode}: {} migrated, {} failed, {} skipped",
        report.total.to_string().bold(),
        report.migrated_count.to_string().green(),
        report.failed_count.to_string().red(),
        report.skipped_count
    );
}

async fn cmd_migrate(config: &LensConfig, format: OutputFormat, args: MigrateArgs) -> anyhow::Result<ExitCode> {
    let mut options = config.migration_options();
    if args.abort_on_error {
        options.continue_on_entry_error = false;
    }
    options.dry_run = args.dry_run;

    let source = MetadataStore::open(&config.datastore_path)
        .with_context(|| format!("opening source index {}", config.datastore_path.display()))?;
    let destination = Arc::new(
        MetadataStore::open(&args.to).with_context(|| format!("opening destination {}", args.to.display()))?,
    );
    let blocks = Arc::new(FsContentStore::open(&config.blocks_path)?);

    let mut engine = MigrationEngine::new(destination.clone());
    let outcome = engine
        .migrate_index(&source, blocks, &options, &interrupt_token())
        .await;
    destination.close()?;

    match outcome {
        Ok(report) => {
            match format {
                OutputFormat::Json => print_json(&serde_json::to_value(&report)?)?,
                OutputFormat::Text => print_report(&report, options.dry_run),
            }
            Ok(exit_status(report.is_clean()))
        }
        Err(MigrationError::Aborted { key, cause }) => {
            match format {
                OutputFormat::Json => print_json(&json!({
                    "aborted": key.to_canonical(),
                    "detail": cause.to_string(),
                }))?,
                OutputFormat::Text => println!(
                    "{} Migration aborted at {}: {}",
                    "✗".red().bold(),
                    key.to_string().yellow(),
                    cause
                ),
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_import(config: &LensConfig, format: OutputFormat, args: ImportArgs) -> anyhow::Result<ExitCode> {
    let data = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let blocks = FsContentStore::open(&config.blocks_path)?;

    let (id, block_count) = if args.unixfs {
        let dag = build_file(&data, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS)?;
        for (id, bytes) in &dag.blocks {
            blocks.put_block(id.codec(), id.hash_function(), bytes)?;
        }
        (dag.root, dag.blocks.len())
    } else {
        let codec = match args.codec {
            ImportCodec::Raw => Codec::Raw,
            ImportCodec::DagJson => Codec::DagJson,
            ImportCodec::DagCbor => Codec::DagCbor,
        };
        (blocks.put_block(codec, HashFunction::Sha2_256, &data)?, 1)
    };

    match format {
        OutputFormat::Json => print_json(&json!({
            "cid": id.to_canonical(),
            "bytes": data.len(),
            "blocks": block_count,
        }))?,
        OutputFormat::Text => println!(
            "{} {}  ({} bytes, {} block{})",
            "✓".green().bold(),
            id.to_string().yellow(),
            data.len(),
            block_count,
            if block_count == 1 { "" } else { "s" }
        ),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_compact(config: &LensConfig, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let store = MetadataStore::open(&config.datastore_path)?;
    let stats = store.compact()?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "entries": stats.entries,
            "bytes_before": stats.bytes_before,
            "bytes_after": stats.bytes_after,
        }))?,
        OutputFormat::Text => println!(
            "{} Compacted {} entries: {} -> {} bytes",
            "✓".green().bold(),
            stats.entries,
            stats.bytes_before,
            stats.bytes_after
        ),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(dir: &std::path::Path, rest: &[&str]) -> Cli {
        let datastore = dir.join("index");
        let blocks = dir.join("blocks");
        let mut argv = vec![
            "lens".to_string(),
            "--datastore".into(),
            datastore.display().to_string(),
            "--blocks".into(),
            blocks.display().to_string(),
        ];
        argv.extend(rest.iter().map(|s| s.to_string()));
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lens.toml");
        std::fs::write(&file, "datastore_path = \"/from/file\"\nmax_depth = 5\n").unwrap();

        let parsed = Cli::try_parse_from(["lens", "--config", file.to_str().unwrap(), "list"]).unwrap();
        let config = resolve_config(&parsed).unwrap();
        assert_eq!(config.datastore_path, std::path::PathBuf::from("/from/file"));
        assert_eq!(config.max_depth, 5);

        let parsed = Cli::try_parse_from([
            "lens",
            "--config",
            file.to_str().unwrap(),
            "--datastore",
            "/from/flag",
            "list",
        ])
        .unwrap();
        assert_eq!(
            resolve_config(&parsed).unwrap().datastore_path,
            std::path::PathBuf::from("/from/flag")
        );
    }

    #[tokio::test]
    async fn import_extract_lookup_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.md");
        std::fs::write(&file, "# Note\n\nbody").unwrap();

        let code = run_command(cli(dir.path(), &["import", file.to_str().unwrap()])).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        let id = ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, b"# Note\n\nbody").unwrap();
        let text = id.to_string();

        let code = run_command(cli(dir.path(), &["extract", &text])).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        let code = run_command(cli(dir.path(), &["lookup", &text, "--format", "json"])).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);

        let next = dir.path().join("next");
        let code = run_command(cli(dir.path(), &["migrate", "--to", next.to_str().unwrap()]))
            .await
            .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        let migrated = MetadataStore::open(&next).unwrap();
        assert_eq!(migrated.keys(), vec![id]);
    }

    #[tokio::test]
    async fn extract_of_missing_block_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let id = ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, b"nowhere").unwrap();
        let code = run_command(cli(dir.path(), &["extract", &id.to_string()])).await.unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        assert!(run_command(cli(dir.path(), &["extract", "garbage"])).await.is_err());
    }
}
