//! # Seed Data Generator
//!
//! Populates a local store with inventory items, suppliers, purchase
//! orders and a stock ledger for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 items (default)
//! cargo run -p autocount-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p autocount-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p autocount-db --bin seed -- --db ./data/bridge.db
//! ```
//!
//! Each item gets two or three costed receipts and an occasional issue, so
//! FIFO valuation has layers to walk. Every tenth item gets an uncosted
//! adjustment only and shows up as unvalued.

use std::env;

use autocount_core::{
    DocumentLine, EntityKind, FieldMap, FieldValue, Money, MovementType, NewStockMovement,
};
use autocount_db::{Database, DbConfig};
use chrono::NaiveDate;

/// Item groups with typical hardware-store stock.
const GROUPS: &[(&str, &[&str])] = &[
    (
        "FAST",
        &[
            "Hex Bolt M6",
            "Hex Bolt M8",
            "Hex Nut M6",
            "Hex Nut M8",
            "Flat Washer M6",
            "Spring Washer M8",
            "Wood Screw 4x30",
            "Self-Tapping Screw 8G",
            "Rivet 4mm",
            "Anchor Plug 6mm",
        ],
    ),
    (
        "ELEC",
        &[
            "Cable Tie 200mm",
            "PVC Conduit 20mm",
            "Junction Box",
            "Switch Socket 13A",
            "LED Bulb 9W",
            "Extension Cord 3m",
            "Insulation Tape",
            "Terminal Block 12W",
        ],
    ),
    (
        "PLMB",
        &[
            "PVC Elbow 1/2in",
            "PVC Tee 1/2in",
            "Ball Valve 1/2in",
            "Thread Seal Tape",
            "Hose Clamp 25mm",
            "Pipe Clip 20mm",
        ],
    ),
];

/// Suppliers (code, company, currency).
const SUPPLIERS: &[(&str, &str, &str)] = &[
    ("400-A001", "Acme Fasteners Sdn Bhd", "MYR"),
    ("400-B002", "Borneo Electrical Supply", "MYR"),
    ("400-S003", "Straits Plumbing Pte Ltd", "SGD"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./bridge_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("AutoCount Bridge Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of inventory items to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./bridge_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 AutoCount Bridge Seed Data Generator");
    println!("=======================================");
    println!("Database: {}", db_path);
    println!("Items:    {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.records().count(EntityKind::InventoryItem).await?;
    if existing > 0 {
        println!("⚠ Database already has {} items", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Suppliers
    for (code, name, currency) in SUPPLIERS {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Text(name.to_string()));
        fields.insert("currency_code".into(), FieldValue::Text(currency.to_string()));
        fields.insert("credit_term".into(), FieldValue::Text("Net 30".into()));
        db.records().insert(EntityKind::Supplier, code, &fields, None).await?;
    }
    println!("✓ Generated {} suppliers", SUPPLIERS.len());

    // Items and ledger
    println!();
    println!("Generating items...");

    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut movements = 0;
    let mut po_lines = Vec::new();

    'outer: for batch in 0.. {
        for (group, names) in GROUPS {
            for name in names.iter() {
                if generated >= count {
                    break 'outer;
                }

                let seed = generated;
                let code = format!("{}-{:04}", group, seed + 1);
                let fields = item_fields(group, name, batch, seed);
                let id = db
                    .records()
                    .insert(EntityKind::InventoryItem, &code, &fields, None)
                    .await?;

                for movement in ledger_for(&id, seed) {
                    db.ledger().append(&movement).await?;
                    movements += 1;
                }

                if po_lines.len() < 5 {
                    po_lines.push(DocumentLine {
                        item_code: code.clone(),
                        description: Some(name.to_string()),
                        quantity: 10 + seed as i64,
                        unit_cost: Money::from_cents(unit_cost_cents(seed)),
                    });
                }

                generated += 1;
                if generated % 50 == 0 {
                    println!("  Generated {} items...", generated);
                }
            }
        }
    }

    // One purchase order covering the first few items
    if !po_lines.is_empty() {
        let total: Money = po_lines.iter().map(|l| l.unit_cost.multiply_quantity(l.quantity)).sum();
        let mut fields = FieldMap::new();
        fields.insert("supplier_code".into(), FieldValue::Text(SUPPLIERS[0].0.into()));
        fields.insert(
            "order_date".into(),
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).ok_or("invalid seed date")?),
        );
        fields.insert("currency_code".into(), FieldValue::Text("MYR".into()));
        fields.insert("total_cents".into(), FieldValue::Money(total));
        fields.insert("lines".into(), FieldValue::Lines(po_lines));
        db.records()
            .insert(EntityKind::PurchaseOrder, "PO-DEV-0001", &fields, None)
            .await?;
        println!("✓ Generated purchase order PO-DEV-0001");
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Generated {} items and {} movements in {:?}",
        generated, movements, elapsed
    );

    println!();
    println!("Verifying cached stock...");
    let mut drifted = 0;
    for item in db.ledger().items().await? {
        if !db.ledger().reconcile(&item.id, false).await?.is_consistent() {
            drifted += 1;
        }
    }
    println!("  Items with drift: {}", drifted);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn unit_cost_cents(seed: usize) -> i64 {
    15 + ((seed * 37) % 900) as i64
}

fn item_fields(group: &str, name: &str, batch: usize, seed: usize) -> FieldMap {
    let cost = unit_cost_cents(seed);
    let label = if batch == 0 {
        name.to_string()
    } else {
        format!("{} (v{})", name, batch + 1)
    };

    let mut fields = FieldMap::new();
    fields.insert("name".into(), FieldValue::Text(label));
    fields.insert("category".into(), FieldValue::Text(group.to_string()));
    fields.insert("unit".into(), FieldValue::Text("PCS".into()));
    fields.insert("cost_cents".into(), FieldValue::Money(Money::from_cents(cost)));
    fields.insert("price_cents".into(), FieldValue::Money(Money::from_cents(cost * 160 / 100)));
    fields.insert(
        "barcode".into(),
        FieldValue::Text(format!("955{:010}", seed)),
    );
    fields
}

fn ledger_for(component_id: &str, seed: usize) -> Vec<NewStockMovement> {
    let movement = |movement_type, quantity, cost: Option<i64>, batch: Option<String>| NewStockMovement {
        component_id: component_id.to_string(),
        movement_type,
        quantity,
        unit_cost: cost.map(Money::from_cents),
        batch_number: batch,
        reference: None,
    };

    if seed % 10 == 9 {
        return vec![movement(MovementType::Adjustment, 12, None, None)];
    }

    let base = unit_cost_cents(seed);
    let mut rows = vec![
        movement(MovementType::Receipt, 50, Some(base), Some(format!("GRN-{:05}-1", seed))),
        movement(MovementType::Receipt, 30, Some(base + 10), Some(format!("GRN-{:05}-2", seed))),
    ];
    if seed % 3 == 0 {
        rows.push(movement(MovementType::Receipt, 20, Some(base + 25), Some(format!("GRN-{:05}-3", seed))));
    }
    if seed % 2 == 0 {
        rows.push(movement(MovementType::Issue, -((seed % 40) as i64 + 5), None, None));
    }
    rows
}
