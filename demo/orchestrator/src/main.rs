// Demo Orchestrator - replays the fraud-check walkthrough end to end:
// a legitimate payment, a velocity burst, impossible travel, and a
// credential hash/verify round trip.

use anyhow::Context;
use chrono::{Duration, Utc};
use colored::Colorize;
use risk_engine::{
    Decision, InMemoryProfileStore, ProfileStore, RiskConfig, RiskEvaluator, TransactionRequest,
    UserId, UserProfile,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use security::secret_hasher::{hash_blocking, verify_blocking};
use security::{Argon2Hasher, HasherConfig};
use std::sync::Arc;
use std::time::Instant;

const HOME_IP: &str = "203.0.113.45";
const FOREIGN_IP: &str = "192.168.1.1";

fn load_config() -> anyhow::Result<RiskConfig> {
    match std::env::var("TXGUARD_CONFIG") {
        Ok(path) => RiskConfig::from_file(&path)
            .with_context(|| format!("loading risk config from {}", path)),
        Err(_) => RiskConfig::from_env().context("loading risk config from environment"),
    }
}

fn print_decision(label: &str, decision: &Decision) {
    let text = decision.to_string();
    let rendered = match decision {
        Decision::Approved => text.as_str().green().bold(),
        Decision::Denied { .. } => text.as_str().red().bold(),
        Decision::Error { .. } => text.as_str().yellow().bold(),
    };
    println!("  {}: {}", label.bold(), rendered);
}

async fn process(
    evaluator: &RiskEvaluator,
    user: &str,
    amount: Decimal,
    ip: &str,
) -> Decision {
    println!(
        "\n{} {} of ${} from {}",
        "💳 Processing transaction for".cyan(),
        user,
        amount,
        ip
    );
    evaluator
        .evaluate(TransactionRequest::new(user, amount, ip))
        .await
}

async fn run_fraud_scenarios(evaluator: &RiskEvaluator) -> anyhow::Result<()> {
    println!("\n{}", "🛡️  Fraud checks".bold().underline());

    // Scenario 1: legitimate transaction
    let result1 = process(evaluator, "user123", dec!(100.00), HOME_IP).await;
    print_decision("Result 1", &result1);

    // Scenario 2: rapid follow-ups push the 60s window past its limit
    let warmup = process(evaluator, "user123", dec!(5.00), HOME_IP).await;
    print_decision("Follow-up", &warmup);
    let result2 = process(evaluator, "user123", dec!(5.00), HOME_IP).await;
    print_decision("Result 2", &result2);

    // Scenario 3: new IP right away; velocity still fires first
    let result3 = process(evaluator, "user123", dec!(500.00), FOREIGN_IP).await;
    print_decision("Result 3", &result3);

    // Scenario 4: quiet account, IP changes one second after login
    let result4 = process(evaluator, "traveler", dec!(75.00), FOREIGN_IP).await;
    print_decision("Result 4", &result4);

    // Scenario 5: unknown user
    let result5 = process(evaluator, "nobody", dec!(1.00), HOME_IP).await;
    print_decision("Result 5", &result5);

    println!(
        "\n  {} {}",
        "📊 Decision JSON:".bold(),
        serde_json::to_string(&result2)?
    );
    Ok(())
}

async fn run_credential_check() -> anyhow::Result<()> {
    println!("\n{}", "🔐 Credential hashing".bold().underline());

    let hasher = Arc::new(Argon2Hasher::new(HasherConfig::default())?);
    let password = "MyS3cr3tP@ssw0rd!";

    let started = Instant::now();
    let digest = hash_blocking(hasher.clone(), password.as_bytes().to_vec()).await?;
    let elapsed = started.elapsed();

    println!("  Stored hash: {}", String::from_utf8_lossy(&digest));
    println!(
        "  Hashing time: {:.4} seconds (shows computational expense)",
        elapsed.as_secs_f64()
    );

    for attempt in [password, "wrongpassword"] {
        let ok = verify_blocking(hasher.clone(), attempt.as_bytes().to_vec(), digest.clone()).await?;
        let outcome = if ok { "SUCCESS".green() } else { "FAIL".red() };
        println!("  Login attempt with '{}': {}", attempt, outcome.bold());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("\n{}", "=================================================================".blue());
    println!("{}", "TxGuard - Real-time Transaction Risk Evaluation".bold());
    println!("{}", "=================================================================".blue());

    let config = load_config()?;
    tracing::info!(?config, "Risk configuration loaded");

    let store = Arc::new(InMemoryProfileStore::new());
    let now = Utc::now();
    store
        .provision(
            &UserId::new("user123"),
            UserProfile::with_login(HOME_IP, now - Duration::hours(1))
                .with_transaction(dec!(50.00), now - Duration::seconds(100))
                .with_transaction(dec!(20.00), now - Duration::seconds(50)),
        )
        .await?;
    store
        .provision(
            &UserId::new("traveler"),
            UserProfile::with_login(HOME_IP, now - Duration::seconds(1)),
        )
        .await?;

    let evaluator = RiskEvaluator::new(store.clone(), config)?;
    run_fraud_scenarios(&evaluator).await?;
    run_credential_check().await?;

    let profile = store.get(&UserId::new("user123")).await?;
    println!(
        "\n{} user123 history: {} records, last login from {}",
        "📈".bold(),
        profile.transaction_history.len(),
        profile.last_login_ip.as_deref().unwrap_or("-")
    );
    println!(
        "{} approved={} denied={} error={}",
        "📈".bold(),
        evaluator.metrics().decisions("approved"),
        evaluator.metrics().decisions("denied"),
        evaluator.metrics().decisions("error")
    );

    Ok(())
}
