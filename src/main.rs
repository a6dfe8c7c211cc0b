//! # Media Minifier - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (directory root, encoder, porta, flag)
//! 2. Carica la configurazione (file JSON o default) e applica gli override
//! 3. Configura il logging (console, log in memoria, file di log)
//! 4. Valida che la directory root esista
//! 5. Avvia la pagina di stato e la pipeline di conversione
//! 6. A lavoro finito la pagina di stato resta attiva fino a Ctrl-C
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-minifier /path/to/videos --encoder bash --encoder-arg encode.sh --port 3000
//! ```

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use media_minifier::{logging, status_server, CommandEncoder, Config, MediaMinifier, ProgressTracker};

#[derive(Parser)]
#[command(name = "media-minifier")]
#[command(about = "Convert every video under a directory, resumably")]
struct Args {
    /// Directory to scan for videos
    #[arg(required_unless_present = "write_config")]
    start_directory: Option<PathBuf>,

    /// Configuration file (JSON); defaults to the user config dir
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Encoder program
    #[arg(short, long)]
    encoder: Option<String>,

    /// Argument passed to the encoder before the file path (repeatable)
    #[arg(long = "encoder-arg", allow_hyphen_values = true)]
    encoder_args: Vec<String>,

    /// Status page port
    #[arg(short, long)]
    port: Option<u16>,

    /// Status page address (overrides --port)
    #[arg(long)]
    status_addr: Option<SocketAddr>,

    /// Do not serve the status page
    #[arg(long)]
    no_status_server: bool,

    /// Append-only log file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Put previously failed files back in the queue
    #[arg(long)]
    retry_failed: bool,

    /// Skip cleanup of files left by interrupted swaps
    #[arg(long)]
    no_reconcile: bool,

    /// Hide the console progress bar
    #[arg(long)]
    no_progress: bool,

    /// Exit once conversion is done instead of keeping the status page up
    #[arg(long)]
    exit_when_done: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(ref encoder) = self.encoder {
            config.encoder_program = encoder.clone();
        }
        if !self.encoder_args.is_empty() {
            config.encoder_args = self.encoder_args.clone();
        }
        if let Some(port) = self.port {
            config.status_addr.set_port(port);
        }
        if let Some(addr) = self.status_addr {
            config.status_addr = addr;
        }
        if self.no_status_server {
            config.status_server = false;
        }
        if let Some(ref log_file) = self.log_file {
            config.log_file = log_file.clone();
        }
        if self.retry_failed {
            config.retry_failed = true;
        }
        if self.no_reconcile {
            config.reconcile_on_start = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match config_path {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    if args.write_config {
        let path = config_path.ok_or_else(|| anyhow::anyhow!("No config path available, use --config"))?;
        config.save_to_file(&path).await?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let tracker = ProgressTracker::new(config.log_history_limit);
    logging::init(&tracker, Some(config.log_file.clone()), args.verbose)?;

    let start_directory = args
        .start_directory
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Missing start directory!"))?;
    if !start_directory.is_dir() {
        error!("Missing start directory: {}", start_directory.display());
        return Err(anyhow::anyhow!(
            "Start directory does not exist or is not a directory: {}",
            start_directory.display()
        ));
    }

    if config.status_server {
        let addr = config.status_addr;
        let server_tracker = tracker.clone();
        tokio::spawn(async move {
            if let Err(e) = status_server::serve(addr, server_tracker).await {
                error!("Status page unavailable: {:#}", e);
            }
        });
    }

    let encoder = Arc::new(CommandEncoder::from_config(&config, tracker.output()));
    let keep_serving = config.status_server && !args.exit_when_done;
    let minifier = MediaMinifier::new(config, encoder, tracker)?.with_progress_bar(!args.no_progress);
    minifier.run(&start_directory).await?;

    if keep_serving {
        info!("Conversion finished, status page stays up until Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}
