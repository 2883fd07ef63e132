//! Pharmacy Agents - Interactive Entry Point
//!
//! Loads the CSV snapshot and answers questions typed at the prompt.

use pharmacy_agents::{load_snapshot, AgentConfig, AgentError, LlmService, MasterAgent};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXAMPLE_QUESTIONS: [&str; 6] = [
    "What should I reorder this week?",
    "Forecast demand for MED001 over the next 14 days",
    "Which items are expiring soon and should be discounted?",
    "Which supplier should I order MED003 from?",
    "Can we afford a purchase of 2000 units of MED002?",
    "Should I move stock between stores?",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    let _ = dotenvy::dotenv();

    // Initialize logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_json = std::env::var("LOG_JSON").map(|v| v == "true").unwrap_or(false);

    if log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| format!("pharmacy_agents={}", log_level).into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| format!("pharmacy_agents={}", log_level).into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Pharmacy Agents v{}", pharmacy_agents::VERSION);

    // Load configuration
    let config = match AgentConfig::from_env() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            info!("  Provider: {:?}", config.llm.provider);
            info!("  Credentials: {}", config.llm.api_keys.len());
            info!("  Data directory: {}", config.data.data_dir.display());
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let snapshot = match load_snapshot(&config.data) {
        Ok(snapshot) => snapshot,
        Err(e @ AgentError::MissingDataFile { .. }) => {
            error!("{}", e);
            eprintln!("\n❌ {}", e);
            eprintln!(
                "   Export sales_history.csv and current_inventory.csv into '{}' (or set DATA_DIR), then run again.",
                config.data.data_dir.display()
            );
            return Err(e.into());
        }
        Err(e) => {
            error!("Failed to load data: {}", e);
            return Err(e.into());
        }
    };

    let llm = LlmService::from_config(&config.llm)?;
    let mut master = MasterAgent::new(snapshot, llm)
        .with_policy(config.policy.clone())
        .with_capital(config.capital.clone());

    print_banner(&master);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n❓ Your question: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" | "q" => break,
            "help" | "?" | "commands" => print_help(),
            "history" => print_history(&master),
            "clear" => {
                master.clear_history();
                println!("✓ Conversation history cleared");
            }
            _ => {
                let answer = master.ask(input).await;
                println!("\n{}", answer);
            }
        }
    }

    info!("Pharmacy Agents session ended");
    println!("\n👋 Goodbye!");
    Ok(())
}

fn print_banner(master: &MasterAgent) {
    let snapshot = master.snapshot();
    println!("{}", "=".repeat(80));
    println!("💊 PHARMACY OPERATIONS ASSISTANT");
    println!("{}", "=".repeat(80));
    println!(
        "Data as of {}: {} sales rows, {} inventory rows, {} suppliers",
        snapshot.as_of,
        snapshot.sales.len(),
        snapshot.inventory.len(),
        snapshot.suppliers.len()
    );
    println!("Type 'help' for commands, 'exit' to quit.");
}

fn print_help() {
    println!("\nCommands:");
    println!("  help, ?, commands   Show this help");
    println!("  history             Show questions asked this session");
    println!("  clear               Clear conversation history");
    println!("  exit, quit, q       Leave");
    println!("\nExample questions:");
    for q in EXAMPLE_QUESTIONS {
        println!("  - {}", q);
    }
}

fn print_history(master: &MasterAgent) {
    let history = master.history();
    if history.is_empty() {
        println!("No questions asked yet.");
        return;
    }
    for (i, turn) in history.iter().enumerate() {
        let agents = turn.agents.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ");
        println!(
            "{}. [{}] {} ({})",
            i + 1,
            turn.timestamp.format("%H:%M:%S"),
            turn.question,
            agents
        );
    }
}
