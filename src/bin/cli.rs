//! AtlasDB CLI
//!
//! Command-line interface for inspecting and editing a database file.

use std::path::PathBuf;
use std::process::ExitCode;

use atlasdb::{AtlasError, Database, Options};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasDB CLI
#[derive(Parser, Debug)]
#[command(name = "atlasdb-cli")]
#[command(about = "CLI for AtlasDB embedded key-value store")]
#[command(version)]
struct Args {
    /// Database file
    #[arg(short, long, default_value = "./atlasdb.db")]
    path: PathBuf,

    /// Page size in bytes (must match the file)
    #[arg(long, default_value = "4096")]
    page_size: usize,

    /// Minimum node fill before rebalancing
    #[arg(long, default_value = "0.5")]
    min_fill: f32,

    /// Maximum node fill before splitting
    #[arg(long, default_value = "0.95")]
    max_fill: f32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a collection
    Create {
        /// Collection name
        collection: String,
    },

    /// Delete a collection and all of its keys
    Drop {
        /// Collection name
        collection: String,
    },

    /// Set a key-value pair
    Put {
        /// Collection name
        collection: String,

        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Get a value by key
    Get {
        /// Collection name
        collection: String,

        /// The key to get
        key: String,
    },

    /// Delete a key
    Del {
        /// Collection name
        collection: String,

        /// The key to delete
        key: String,
    },

    /// Print every key-value pair of a collection, or every collection name
    Dump {
        /// Collection name
        collection: Option<String>,
    },

    /// Print file statistics
    Stat,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,atlasdb=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let options = Options::builder()
        .page_size(args.page_size)
        .min_fill_percent(args.min_fill)
        .max_fill_percent(args.max_fill)
        .build();

    let db = match Database::open(&args.path, options) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&db, args.command);
    let closed = db.close();

    match result.and(closed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AtlasError::KeyNotFound) => {
            eprintln!("(not found)");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(db: &Database, command: Commands) -> atlasdb::Result<()> {
    match command {
        Commands::Create { collection } => db.update(|tx| {
            tx.create_collection(collection.as_bytes())?;
            Ok(())
        }),

        Commands::Drop { collection } => {
            db.update(|tx| tx.delete_collection(collection.as_bytes()))
        }

        Commands::Put {
            collection,
            key,
            value,
        } => db.update(|tx| {
            tx.get_collection(collection.as_bytes())?
                .put(key.as_bytes(), value.as_bytes())
        }),

        Commands::Get { collection, key } => {
            let value = db.view(|tx| {
                tx.get_collection(collection.as_bytes())?
                    .find(key.as_bytes())
            })?;
            println!("{}", String::from_utf8_lossy(&value));
            Ok(())
        }

        Commands::Del { collection, key } => db.update(|tx| {
            tx.get_collection(collection.as_bytes())?
                .remove(key.as_bytes())
        }),

        Commands::Dump {
            collection: Some(collection),
        } => db.view(|tx| {
            for item in tx.get_collection(collection.as_bytes())?.items()? {
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(&item.key),
                    String::from_utf8_lossy(&item.value)
                );
            }
            Ok(())
        }),

        Commands::Dump { collection: None } => db.view(|tx| {
            for name in tx.collections()? {
                println!("{}", String::from_utf8_lossy(&name));
            }
            Ok(())
        }),

        Commands::Stat => {
            let stats = db.stats();
            println!("path:          {}", db.path().display());
            println!("page size:     {}", stats.page_size);
            println!("root page:     {}", stats.root);
            println!("freelist page: {}", stats.freelist_page);
            println!("max page:      {}", stats.max_page);
            println!("free pages:    {}", stats.free_pages);
            println!("pending pages: {}", stats.pending_pages);
            println!("last txid:     {}", stats.txid);
            Ok(())
        }
    }
}
