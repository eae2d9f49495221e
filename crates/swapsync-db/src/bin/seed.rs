//! # Demo Shop Seeder
//!
//! Populates a database with one demo company for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p swapsync-db --bin seed
//!
//! # Specify database path
//! cargo run -p swapsync-db --bin seed -- --db ./data/swapsync.db
//! ```
//!
//! ## Seeded Data
//! - super admin `admin`, manager `demo_manager`, shop keeper `demo_keeper`,
//!   repairer `demo_tech` (password `changeme123` for all)
//! - phones across a few brands, accessories and spare parts
//! - two customers

use std::env;

use swapsync_core::money::Money;
use swapsync_core::{Actor, PhoneSpecs, Role};
use swapsync_db::{Database, DbConfig, NewCustomer, NewPhone, NewProduct, NewUser};

const PASSWORD: &str = "changeme123";

/// (brand, model, condition, value in cedis, ram, storage)
const PHONES: &[(&str, &str, &str, i64, &str, &str)] = &[
    ("Samsung", "Galaxy A14", "New", 1_650, "4GB", "64GB"),
    ("Samsung", "Galaxy S21", "Used", 4_200, "8GB", "128GB"),
    ("Apple", "iPhone 11", "Used", 3_900, "4GB", "64GB"),
    ("Apple", "iPhone 13", "New", 8_500, "4GB", "128GB"),
    ("Tecno", "Spark 10 Pro", "New", 1_450, "8GB", "128GB"),
    ("Infinix", "Hot 30", "New", 1_550, "8GB", "128GB"),
];

/// (category, name, cost, price, quantity)
const PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("Accessories", "Tempered Glass", 5, 15, 60),
    ("Accessories", "USB-C Cable", 12, 30, 40),
    ("Accessories", "20W Charger", 45, 90, 25),
    ("Spare Parts", "A14 Screen", 180, 320, 6),
    ("Spare Parts", "iPhone 11 Battery", 150, 280, 4),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./swapsync_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("SwapSync Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./swapsync_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 SwapSync Demo Seeder");
    println!("=======================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let users = db.users();
    if users.get_by_username("demo_manager").await?.is_some() {
        println!("⚠ Demo company already exists");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let admin = users.bootstrap_super_admin("admin", PASSWORD, "Platform Admin").await?;
    let admin = Actor::new(admin.id, Role::SuperAdmin, None);

    let manager = users
        .create_user(&admin, staff("demo_manager", "Kofi Mensah", Role::Manager))
        .await?;
    let manager = Actor::new(manager.id, Role::Manager, None);
    users
        .create_user(&manager, staff("demo_keeper", "Ama Owusu", Role::ShopKeeper))
        .await?;
    users
        .create_user(&manager, staff("demo_tech", "Yaw Boateng", Role::Repairer))
        .await?;
    println!("✓ Created demo company (4 accounts)");

    let phones_category = db.catalog().find_or_create_category("Phones").await?;
    for (brand, model, condition, value, ram, storage) in PHONES {
        let mut specs = PhoneSpecs::new();
        specs.insert("ram".to_string(), ram.to_string());
        specs.insert("storage".to_string(), storage.to_string());
        let new = NewPhone {
            brand: brand.to_string(),
            model: model.to_string(),
            imei: None,
            condition: condition.to_string(),
            value: Money::from_major(*value),
            cost_price: Money::from_major(value * 85 / 100),
            specs,
            category_id: Some(phones_category.id),
        };
        if let Err(e) = db.phones().create_phone(&manager, new).await {
            eprintln!("Failed to add {} {}: {}", brand, model, e);
        }
    }
    println!("✓ Added {} phones", PHONES.len());

    for (category, name, cost, price, quantity) in PRODUCTS {
        let category = db.catalog().find_or_create_category(category).await?;
        let new = NewProduct {
            name: name.to_string(),
            description: None,
            sku: None,
            barcode: None,
            category_id: category.id,
            brand: None,
            cost_price: Money::from_major(*cost),
            selling_price: Money::from_major(*price),
            quantity: *quantity,
            min_stock_level: 5,
        };
        if let Err(e) = db.products().create_product(&manager, new).await {
            eprintln!("Failed to add {}: {}", name, e);
        }
    }
    println!("✓ Added {} products", PRODUCTS.len());

    let keeper = users
        .get_by_username("demo_keeper")
        .await?
        .ok_or("demo keeper missing after creation")?;
    let keeper = Actor::new(keeper.id, Role::ShopKeeper, keeper.parent_user_id);
    for (name, phone) in [("Esi Appiah", "0244123456"), ("Kwame Asante", "0201987654")] {
        db.customers()
            .create_customer(
                &keeper,
                NewCustomer {
                    full_name: name.to_string(),
                    phone_number: phone.to_string(),
                    email: None,
                },
            )
            .await?;
    }
    println!("✓ Added 2 customers");

    println!();
    println!("✓ Seed complete! Log in as demo_manager / {}", PASSWORD);
    Ok(())
}

fn staff(username: &str, full_name: &str, role: Role) -> NewUser {
    NewUser {
        username: username.to_string(),
        password: PASSWORD.to_string(),
        full_name: full_name.to_string(),
        email: None,
        phone_number: Some("0240000000".to_string()),
        role,
        company_name: (role == Role::Manager).then(|| "Demo Phones".to_string()),
        use_company_sms_branding: role == Role::Manager,
    }
}
