//! Register Seeding Tool
//!
//! Inserts synthetic tuition payments and payroll entries so the change
//! feeds and the sync pipeline can be exercised under load.
//!
//! Run with: cargo run --bin seed_registers --release -- --tuition 1000 --payroll 200

use std::time::Instant;

use chrono::Datelike;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;

const CLASSES: &[&str] = &["6A", "6B", "5A", "4C", "3B"];
const TUITION_STATUSES: &[&str] = &["paid", "paid", "paid", "pending", "overdue"];
const DEPARTMENTS: &[&str] = &["Teaching", "Administration", "Maintenance"];

fn arg_or(args: &[String], flag: &str, default: u64) -> u64 {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let tuition_count = arg_or(&args, "--tuition", 1000);
    let payroll_count = arg_or(&args, "--payroll", 100);

    let database_url = std::env::var("DATABASE_URL")?;

    println!(
        "Seeding {} tuition payments and {} payroll entries",
        tuition_count, payroll_count
    );
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    let batch = uuid::Uuid::new_v4().simple().to_string();
    let today = chrono::Utc::now().date_naive();
    let start = Instant::now();
    let mut tuition_ok = 0u64;
    let mut payroll_ok = 0u64;

    for i in 0..tuition_count {
        let idx = i as usize;
        let result = sqlx::query(
            r#"
            INSERT INTO tuition_payments
                (id, student_name, amount, payment_date, payment_method, status, class, period, reference)
            VALUES ($1, $2, $3, $4, 'cash', $5, $6, $7, '')
            "#,
        )
        .bind(format!("seed-{batch}-t{i}"))
        .bind(format!("Student {i}"))
        .bind(Decimal::from(150_000 + (i % 7) * 25_000))
        .bind(today)
        .bind(TUITION_STATUSES[idx % TUITION_STATUSES.len()])
        .bind(CLASSES[idx % CLASSES.len()])
        .bind(format!("Term {}", i % 3 + 1))
        .execute(&pool)
        .await;

        if result.is_ok() {
            tuition_ok += 1;
        }

        if (i + 1) % 1000 == 0 {
            println!("Inserted {} tuition payments...", i + 1);
        }
    }

    for i in 0..payroll_count {
        let idx = i as usize;
        let result = sqlx::query(
            r#"
            INSERT INTO payroll_entries
                (id, employee_id, employee_name, net_salary, effective_date,
                 payment_month, payment_year, position, department, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'Staff', $8, 'active')
            "#,
        )
        .bind(format!("seed-{batch}-p{i}"))
        .bind(format!("EMP{i:05}"))
        .bind(format!("Employee {i}"))
        .bind(Decimal::from(300_000 + (i % 5) * 50_000))
        .bind(today)
        .bind(today.month() as i32)
        .bind(today.year())
        .bind(DEPARTMENTS[idx % DEPARTMENTS.len()])
        .execute(&pool)
        .await;

        if result.is_ok() {
            payroll_ok += 1;
        }
    }

    let elapsed = start.elapsed();
    let total = tuition_ok + payroll_ok;
    let rate = total as f64 / elapsed.as_secs_f64();

    println!("\n=== Seed Results ===");
    println!("Tuition payments: {}/{}", tuition_ok, tuition_count);
    println!("Payroll entries: {}/{}", payroll_ok, payroll_count);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} rows/sec", rate);

    Ok(())
}
