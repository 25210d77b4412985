//! Sample Transaction Producer
//!
//! Publishes raw transactions to NATS for exercising the scoring service.
//! A share of the traffic is deliberately imperfect: unseen categories,
//! missing fields and malformed amounts.

use rand::Rng;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

const CATEGORIES: &[&str] = &[
    "entertainment",
    "food_dining",
    "gas_transport",
    "grocery_pos",
    "health_fitness",
    "home",
    "kids_pets",
    "misc_net",
    "misc_pos",
    "personal_care",
    "shopping_net",
    "shopping_pos",
    "travel",
];

/// Categories the model never saw in training
const UNSEEN_CATEGORIES: &[&str] = &["crypto_atm", "gambling", "Grocery_POS"];

/// Optional fields that may be dropped from imperfect transactions
const DROPPABLE_FIELDS: &[&str] = &["zip", "lat", "long", "city_pop"];

struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
}

impl TransactionGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
        }
    }

    fn base(&mut self, amount: f64) -> Map<String, Value> {
        self.transaction_counter += 1;

        let mut fields = Map::new();
        fields.insert(
            "transaction_id".to_string(),
            json!(format!("tx_{:012}", self.transaction_counter)),
        );
        fields.insert("amount".to_string(), json!((amount * 100.0).round() / 100.0));
        fields.insert("category".to_string(), json!(self.random_choice(CATEGORIES)));
        fields.insert(
            "zip".to_string(),
            json!(format!("{:05}", self.rng.gen_range(1000..99950))),
        );
        fields.insert("lat".to_string(), json!(self.rng.gen_range(25.0..49.0)));
        fields.insert("long".to_string(), json!(self.rng.gen_range(-124.0..-67.0)));
        fields.insert(
            "city_pop".to_string(),
            json!(self.rng.gen_range(100..2_000_000)),
        );
        fields
    }

    fn generate_legitimate(&mut self) -> Value {
        let amount = self.rng.gen_range(1.0..300.0);
        Value::Object(self.base(amount))
    }

    fn generate_suspicious(&mut self) -> Value {
        let amount = self.rng.gen_range(900.0..5000.0);
        let mut fields = self.base(amount);
        fields.insert(
            "category".to_string(),
            json!(self.random_choice(&["misc_net", "shopping_net", "grocery_pos"])),
        );
        Value::Object(fields)
    }

    /// A transaction with one kind of input defect
    fn generate_imperfect(&mut self) -> Value {
        let amount = self.rng.gen_range(1.0..1500.0);
        let mut fields = self.base(amount);

        match self.rng.gen_range(0..3) {
            0 => {
                fields.insert(
                    "category".to_string(),
                    json!(self.random_choice(UNSEEN_CATEGORIES)),
                );
            }
            1 => {
                let field = self.random_choice(DROPPABLE_FIELDS);
                fields.remove(field);
            }
            _ => {
                fields.insert("amount".to_string(), json!("not-a-number"));
            }
        }
        Value::Object(fields)
    }

    fn generate(&mut self, fraud_rate: f64, defect_rate: f64) -> Value {
        if self.rng.gen_bool(defect_rate) {
            self.generate_imperfect()
        } else if self.rng.gen_bool(fraud_rate) {
            self.generate_suspicious()
        } else {
            self.generate_legitimate()
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_producer=info".parse()?),
        )
        .init();

    info!("Starting Sample Transaction Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("transactions");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let defect_rate: f64 = args
        .get(5)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.05_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        defect_rate = defect_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, fraud_rate, defect_rate, delay_ms).await;
        }
    };

    let mut generator = TransactionGenerator::new();
    info!("Starting to publish {} transactions...", count);

    for i in 0..count {
        let transaction = generator.generate(fraud_rate, defect_rate);
        let payload = serde_json::to_vec(&transaction)?;
        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!("Published {}/{} transactions", i + 1, count);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;
    info!("Completed! Published {} transactions", count);

    Ok(())
}

async fn run_dry_mode(
    count: u64,
    fraud_rate: f64,
    defect_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = TransactionGenerator::new();
    for i in 0..count {
        let transaction = generator.generate(fraud_rate, defect_rate);
        if (i + 1) % 10 == 0 || i == 0 {
            info!(
                "Sample transaction {}:\n{}",
                i + 1,
                serde_json::to_string_pretty(&transaction)?
            );
        }
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
