use anyhow::Context;
use clap::Parser;
use serde_json::{Map, Value};
use sql_dumper::settings::{overlay, parse_assignment};
use sql_dumper::Dumper;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sql-dump")]
#[command(
    about = "Dump a MySQL, PostgreSQL or SQLite database as replayable SQL",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Connection string, e.g. mysql:host=localhost;dbname=shop
    #[arg(long)]
    dsn: String,

    /// User name (overrides the DSN)
    #[arg(long, env = "SQL_DUMP_USER")]
    user: Option<String>,

    /// Password (overrides the DSN)
    #[arg(long, env = "SQL_DUMP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Write the dump to this file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Dump settings as a JSON object
    #[arg(long)]
    settings: Option<String>,

    /// Read dump settings from a JSON file
    #[arg(long)]
    settings_file: Option<PathBuf>,

    /// Override one setting, e.g. --set compress=gzip (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

impl Cli {
    /// Merge --settings, --settings-file and --set, in that order
    fn settings_map(&self) -> anyhow::Result<Value> {
        let mut merged = Value::Object(Map::new());

        if let Some(inline) = &self.settings {
            let value: Value =
                serde_json::from_str(inline).context("--settings is not valid JSON")?;
            overlay(&mut merged, &value);
        }

        if let Some(path) = &self.settings_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read settings file {}", path.display()))?;
            let value: Value = serde_json::from_str(&text)
                .with_context(|| format!("settings file {} is not valid JSON", path.display()))?;
            overlay(&mut merged, &value);
        }

        for assignment in &self.overrides {
            overlay(&mut merged, &Value::Object(parse_assignment(assignment)?));
        }

        Ok(merged)
    }
}

/// Whether a compressed dump's file name lacks the usual extension
fn lacks_suffix(path: &Path, suffix: &str) -> bool {
    !suffix.is_empty() && !path.to_string_lossy().ends_with(suffix)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout may carry the dump itself
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings_map()?;

    let dumper = Dumper::new(&cli.dsn, cli.user.clone(), cli.password.clone(), &settings)?;
    if let Some(path) = &cli.output {
        let suffix = dumper.settings().compress.extension_suffix();
        if lacks_suffix(path, suffix) {
            tracing::warn!(
                output = %path.display(),
                "Output file name does not end with {}",
                suffix
            );
        }
    }
    let summary = dumper
        .dump(cli.output.as_deref())
        .await
        .context("dump failed")?;

    if let Some(path) = &cli.output {
        tracing::info!(
            output = %path.display(),
            tables = summary.tables,
            rows = summary.rows,
            "Dump written"
        );
    }

    Ok(())
}
