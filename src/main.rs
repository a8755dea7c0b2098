use anyhow::Result;
use rusqlite::Connection;
use std::env;

use snapsplit::{setup_database, verify_count, AppConfig};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init()?,
        Some("status") => run_status()?,
        _ => print_usage(),
    }

    Ok(())
}

/// Create (or open) the database and make sure the schema exists.
fn run_init() -> Result<()> {
    println!("🗄️  SnapSplit - Database Init");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::from_env();

    println!("\n🔧 Setting up database at {:?}...", config.db_path);
    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode");

    let count = verify_count(&conn)?;
    println!("✓ Database contains {} archived receipts", count);

    println!("\n✅ Init complete. Start the API with:");
    println!("   cargo run --bin snapsplit-server --features server");

    Ok(())
}

fn run_status() -> Result<()> {
    let config = AppConfig::from_env();

    if !config.db_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.db_path);
        eprintln!("   Run: cargo run -- init");
        std::process::exit(1);
    }

    let conn = Connection::open(&config.db_path)?;
    let count = verify_count(&conn)?;

    println!("📊 SnapSplit status");
    println!("   Database: {:?}", config.db_path);
    println!("   Archived receipts: {}", count);
    println!(
        "   OCR key: {}",
        if config.mindee_api_key.is_some() { "configured" } else { "missing" }
    );
    println!(
        "   OpenAI key: {}",
        if config.openai_api_key.is_some() { "configured" } else { "missing" }
    );

    Ok(())
}

fn print_usage() {
    println!("SnapSplit v{}", snapsplit::VERSION);
    println!();
    println!("Usage:");
    println!("   snapsplit init     Create the SQLite database");
    println!("   snapsplit status   Show database and configuration status");
    println!();
    println!("API server: cargo run --bin snapsplit-server --features server");
}
