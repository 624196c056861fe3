mod config;
mod db;
mod error;
mod ingest;
mod ledger;
mod models;
mod ocr;
mod receipt;
mod report;
mod review;
mod schema;

use crate::config::{AppPaths, Settings};
use crate::db::Store;
use crate::error::{Error, Result};
use crate::ocr::OcrClient;
use crate::review::TerminalReviewer;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "spending-tracker")]
#[command(about = "Scan receipts, record purchases and split shared costs")]
struct Args {
    /// JSON settings file (OCR endpoint, default cost share, participants)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the database and stored OCR responses
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the schema and seed participants
    Init,
    /// OCR a receipt image and record it
    Ingest { image: Option<PathBuf> },
    /// OCR a receipt image and only store the response
    Fetch { image: Option<PathBuf> },
    /// Record an already stored OCR response
    Load { json: PathBuf },
    /// Recalculate what a debtor owes on a receipt from its purchase lines
    Recompute {
        receipt_id: i64,
        /// Defaults to the configured debtor
        #[arg(long)]
        debtor: Option<i64>,
    },
    /// Show the latest receipt, its re-summed subtotal and its shared payments
    Recent,
    /// Itemized split of the latest receipt
    Report,
    /// List cataloged items
    Items,
    /// Mark a shared payment as paid
    Pay {
        shared_payment_id: i64,
        #[arg(long)]
        unpaid: bool,
    },
    /// Manage participants
    #[command(subcommand)]
    Participant(ParticipantCommand),
}

#[derive(Debug, Subcommand)]
enum ParticipantCommand {
    Add {
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    List,
}

fn prompt_image_path() -> Result<PathBuf> {
    println!("Enter the receipt pic filename:");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::InvalidInput("no receipt image given".into()));
    }
    Ok(PathBuf::from(line))
}

fn fetch(paths: &AppPaths, settings: &Settings, image: Option<PathBuf>) -> Result<(ocr::OcrResponse, PathBuf)> {
    let image = match image {
        Some(image) => image,
        None => prompt_image_path()?,
    };
    let client = OcrClient::new(settings.ocr.clone())?;
    ocr::fetch_results(&client, &paths.results_dir, &image)
}

fn load(store: &Store, settings: &Settings, json_path: &Path) -> Result<()> {
    let mut reviewer = TerminalReviewer::stdio();
    let summary = ingest::ingest_file(store, &settings.sharing, json_path, &mut reviewer)?;
    print!("{}", report::render_summary(&summary));
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    let paths = AppPaths::discover(&args.root)?;
    let store = db::init_database(&paths.db_path, &settings.participants)?;

    match args.command {
        Command::Init => {
            println!("Database ready at {}", store.path().display());
        }
        Command::Ingest { image } => {
            let (response, stored) = fetch(&paths, &settings, image)?;
            if !response.is_success() {
                return Err(Error::OcrStatus(response.status));
            }
            load(&store, &settings, &stored)?;
        }
        Command::Fetch { image } => {
            let (response, stored) = fetch(&paths, &settings, image)?;
            println!("Status {}; response stored at {}", response.status, stored.display());
        }
        Command::Load { json } => {
            load(&store, &settings, &paths.resolve_result(&json))?;
        }
        Command::Recompute { receipt_id, debtor } => {
            let debtor = debtor.unwrap_or(settings.sharing.debtor);
            let updated = store.recalculate_shared_payment(receipt_id, debtor)?;
            println!("Updated {updated} shared payment(s)");
            print!(
                "{}",
                report::render_shared_payments(&store.shared_payments_for_receipt(receipt_id)?)
            );
        }
        Command::Recent => {
            match store.recent_receipt()? {
                Some(receipt) => print!("{}", report::render_receipt(&receipt)),
                None => println!("No receipts recorded."),
            }
            if let Some(subtotal) = store.recent_subtotal()? {
                println!("subtotal from purchases {subtotal:.2}");
            }
            print!("{}", report::render_shared_payments(&store.recent_shared_payments()?));
        }
        Command::Report => {
            print!("{}", report::render_report(&store.report()?));
        }
        Command::Items => {
            print!("{}", report::render_items(&store.list_items()?));
        }
        Command::Pay {
            shared_payment_id,
            unpaid,
        } => {
            store.set_paid(shared_payment_id, !unpaid)?;
            if let Some(payment) = store.shared_payment(shared_payment_id)? {
                print!("{}", report::render_shared_payments(&[payment]));
            }
        }
        Command::Participant(ParticipantCommand::Add { name, email }) => {
            let id = store.add_participant(&name, email.as_deref())?;
            println!("Added participant {id}");
        }
        Command::Participant(ParticipantCommand::List) => {
            print!("{}", report::render_participants(&store.list_participants()?));
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(err) = run(Args::parse()) {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
