//! Re-runs auto-linking for one transaction and prints the JSON result.
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info`).

use std::process::ExitCode;

use clap::Parser;
use txaudit_lib::linking::{AutoLinkOptions, AutoLinker};
use txaudit_lib::state::{load_config, open_db};

/// Without a flag every assigned contact is resynced one at a time.
#[derive(Debug, Parser)]
#[command(
    name = "repair_transaction_links",
    about = "Re-link emails and text threads to a transaction",
    version
)]
struct Cli {
    /// Transaction to repair.
    transaction_id: String,

    /// Link a single contact only.
    #[arg(long, value_name = "ID", conflicts_with = "full_scan")]
    contact: Option<String>,

    /// One combined pass over all contacts, including structured participants.
    #[arg(long)]
    full_scan: bool,
}

fn run(cli: Cli) -> Result<String, String> {
    let config = load_config()?;
    let db = open_db(&config).map_err(|e| format!("Failed to open database: {e}"))?;
    let linker = AutoLinker::new(&db, AutoLinkOptions::from(&config.auto_link));

    let json = if let Some(contact_id) = cli.contact.as_deref() {
        let result = linker
            .auto_link_contact(contact_id, &cli.transaction_id)
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&result)
    } else if cli.full_scan {
        let result = linker
            .auto_link_transaction(&cli.transaction_id)
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&result)
    } else {
        let result = linker
            .resync_transaction(&cli.transaction_id)
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&result)
    };
    json.map_err(|e| format!("Failed to serialize result: {e}"))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(1)
        }
    }
}
