use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use slide_config::EngineConfig;
use slide_runtime::builtins::builtin_registry;
use slide_runtime::lifecycle::{Engine, wait_for_signal};
use slide_runtime::tracing_init::init_tracing;

#[derive(Parser)]
#[command(name = "slide", about = "Sliding and tumbling window engine over JSON Lines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the window engine until the input ends or a signal arrives
    Run {
        /// Path to slide.toml config file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a config file and print the resolved window
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the built-in window functions and timestamp extractors
    Functions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let (engine_config, base_dir) = load_config(&config)?;
            let _guard = init_tracing(&engine_config.logging, &base_dir)?;

            let engine = Engine::start(engine_config, &base_dir)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            tracing::info!(domain = "sys", "window engine running");

            let cancel = engine.cancel_token();
            let signals = tokio::spawn(wait_for_signal(cancel.clone()));
            let report = engine.wait().await.map_err(|e| anyhow::anyhow!("{e}"))?;
            // unblock the signal listener when the input ended on its own
            cancel.cancel();
            let _ = signals.await;

            println!(
                "lines={} records={} malformed={} extraction_failed={} late_forwarded={} late_dropped={} activations={} published={} acked={}/{}",
                report.lines,
                report.records,
                report.malformed,
                report.extraction_failed,
                report.late_forwarded,
                report.late_dropped,
                report.activations,
                report.published,
                report.acked,
                report.dispatched,
            );
        }
        Commands::Check { config } => {
            let (engine_config, _) = load_config(&config)?;
            let plan = &engine_config.plan;
            println!("function: {}", plan.function);
            println!("length:   {:?}", plan.length);
            println!("slide:    {:?}", plan.slide);
            match &plan.event_time {
                Some(et) => println!(
                    "time:     event time (extractor {}, max lag {:?}, watermark every {:?}, late data {})",
                    et.extractor,
                    et.max_lag,
                    et.watermark_interval,
                    et.late_data_target.as_deref().unwrap_or("dropped"),
                ),
                None => println!("time:     processing time"),
            }
        }
        Commands::Functions => {
            let registry = builtin_registry();
            println!("functions:  {}", registry.function_names().join(", "));
            println!("extractors: {}", registry.extractor_names().join(", "));
        }
    }

    Ok(())
}

fn load_config(config: &Path) -> Result<(EngineConfig, PathBuf)> {
    let config_path = config
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("config path '{}': {e}", config.display()))?;
    let engine_config = EngineConfig::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("config path '{}' has no parent", config_path.display()))?;
    Ok((engine_config, base_dir))
}
