//! Demo catalog seeder.
//!
//! ```text
//! seed [--config PATH] [--db PATH] [--count N]
//! ```
//!
//! Registers products through the settlement engine, so each opening quantity
//! is backed by an "Initial stock" movement and the ledger reconciles from
//! the start. SKUs that already exist are skipped.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info, warn};

use stockpulse_core::{CoreError, NewProduct, ValidationError};
use stockpulse_ledger::{init_tracing, LedgerConfig, LedgerError, LedgerResult, SettlementEngine};

const SEED_ACTOR: &str = "seed";

/// (sku, name, buy, sell, opening stock, reorder threshold)
const DEMO_PRODUCTS: &[(&str, &str, i64, i64, i64, i64)] = &[
    ("CHG-25W", "25W USB-C Charger", 45_000, 79_900, 24, 5),
    ("CBL-USBC-1M", "USB-C Cable 1m", 8_000, 19_900, 60, 10),
    ("CBL-LTG-1M", "Lightning Cable 1m", 12_000, 24_900, 35, 10),
    ("EAR-WIRED", "Wired Earphones", 15_000, 34_900, 18, 5),
    ("EAR-TWS", "True Wireless Earbuds", 90_000, 149_900, 8, 3),
    ("PWR-10K", "Power Bank 10000mAh", 70_000, 119_900, 12, 4),
    ("GLS-STD", "Tempered Glass Protector", 2_500, 9_900, 150, 25),
    ("CASE-SIL", "Silicone Case", 6_000, 19_900, 40, 10),
    ("SD-64", "microSD Card 64GB", 30_000, 54_900, 20, 5),
    ("SIM-EJ", "SIM Ejector Pin", 100, 1_000, 4, 20),
];

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Seeding failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LedgerResult<()> {
    let mut config_path = None;
    let mut db_path = None;
    let mut count = DEMO_PRODUCTS.len();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            "--db" => db_path = args.next().map(PathBuf::from),
            "--count" => {
                count = args
                    .next()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(DEMO_PRODUCTS.len())
            }
            other => eprintln!("ignoring unknown argument: {other}"),
        }
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    let engine = SettlementEngine::from_config(&config).await?;
    let mut created = 0;

    for &(sku, name, buy, sell, opening, min_stock) in DEMO_PRODUCTS.iter().take(count) {
        let product = NewProduct {
            sku: sku.to_string(),
            barcode: None,
            name: name.to_string(),
            buy_price_cents: buy,
            sell_price_cents: sell,
            mrp_cents: Some(sell),
            opening_stock: opening,
            min_stock,
        };

        match engine.register_product(&product, SEED_ACTOR).await {
            Ok(p) => {
                created += 1;
                info!(sku = %p.sku, stock = p.stock, "Seeded product");
            }
            Err(LedgerError::Rejected(CoreError::Validation(ValidationError::AlreadyExists {
                ..
            }))) => {
                warn!(sku = %sku, "Already present, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    let summary = engine.stock_summary().await?;
    info!(
        created,
        total_products = summary.total_products,
        low_stock = summary.low_stock_count,
        "Seeding complete"
    );

    engine.database().close().await;
    Ok(())
}
