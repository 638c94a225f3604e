mod catalog;
mod fetch;
mod parser;
mod server;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use fetch::GatewayClient;
use settings::Settings;

#[derive(Parser)]
#[command(name = "scripture_extract", about = "Scripture passage lookup and verse extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Interface to bind (default from settings)
        #[arg(long)]
        host: Option<String>,
        /// First port to try; later ports are tried while it is taken
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },
    /// Fetch one passage and print the extracted JSON
    Fetch {
        /// Reference or search text, e.g. "John 3:16"
        query: String,
        /// Translation code (default from settings)
        #[arg(short, long)]
        version: Option<String>,
    },
    /// Extract passages from saved HTML pages
    Extract {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List accepted translation codes
    Versions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = match &cli.command {
        Commands::Serve { host, port } => Settings::load_with(host.as_deref(), *port)?,
        _ => Settings::load_with(None, None)?,
    };
    info!(settings = ?settings, "settings loaded");

    let result = match cli.command {
        Commands::Serve { .. } => return server::serve(settings).await,
        Commands::Fetch { query, version } => {
            let catalog = settings.catalog();
            let version = catalog
                .resolve(version.as_deref(), &settings.default_version)
                .with_context(|| format!("unknown translation {:?}", version))?;
            let client = GatewayClient::new(settings.upstream_url.clone())?;
            let html = client.fetch_passage(&query, &version).await?;
            let result = parser::extract_passage(&html);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Extract { paths } => extract_files(&paths),
        Commands::Versions => {
            for code in settings.catalog().codes() {
                println!("{}", code);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Run extraction over local pages in parallel, one JSON line per file.
fn extract_files(paths: &[PathBuf]) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let results: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let outcome = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))
                .map(|html| parser::extract_passage(&html));
            pb.inc(1);
            (path, outcome)
        })
        .collect();
    pb.finish_and_clear();

    let mut failed = 0usize;
    for (path, outcome) in results {
        match outcome {
            Ok(result) => {
                let line = serde_json::json!({
                    "path": path.display().to_string(),
                    "content": result.content,
                    "verses": result.verses,
                });
                println!("{}", line);
            }
            Err(e) => {
                failed += 1;
                tracing::warn!("{:#}", e);
            }
        }
    }

    info!("Extracted {} files ({} unreadable)", paths.len() - failed, failed);
    Ok(())
}

/// Wall-clock summary for the end-of-run line, e.g. `2m 5s`.
fn format_duration(d: std::time::Duration) -> String {
    let total = d.as_secs();
    match (total / 3600, total % 3600 / 60, total % 60) {
        (0, 0, _) => format!("{:.1}s", d.as_secs_f64()),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, s) => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn durations_read_naturally() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from(["scripture_extract", "serve", "--host", "0.0.0.0", "-p", "8080"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve { host: Some(ref h), port: Some(8080) } if h == "0.0.0.0"
        ));
    }
}
