use std::sync::Arc;

use inbox_triage::config::TriageConfig;
use inbox_triage::llm::{LlmBackend, LlmConfig, create_provider};
use inbox_triage::mail::{GmailRetriever, assemble_pool};
use inbox_triage::oracle::LlmOracle;
use inbox_triage::pipeline::{ClassifyMode, TriagePipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Read API key from environment
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let model = std::env::var("TRIAGE_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let mode = match std::env::var("TRIAGE_MODE").as_deref() {
        Ok("per_conversation") => ClassifyMode::PerConversation,
        _ => ClassifyMode::Pooled,
    };

    let config = TriageConfig::from_env();

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Mode: {:?}", mode);
    eprintln!("   Accounts: {}", config.accounts.len());
    eprintln!("   Query: {} (limit {})\n", config.query, config.limit);

    // LLM provider behind the oracle seam
    let llm_config = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let llm = create_provider(&llm_config)?;
    let oracle = Arc::new(LlmOracle::new(llm));

    // Pull the conversation pool. No accounts just means an empty digest.
    let retriever = GmailRetriever::new(reqwest::Client::new());
    let pool = assemble_pool(&retriever, &config.accounts, &config.query, config.limit).await;

    let pipeline = TriagePipeline::new(oracle)
        .with_retry(config.retry)
        .with_batcher(config.batcher)
        .with_mode(mode);

    let digest = pipeline.run(pool).await?;

    eprintln!(
        "   Claimed {} conversation(s), {} action item(s) across {} categories",
        digest.total_claimed(),
        digest.total_action_items(),
        digest.sections.len(),
    );

    // The digest itself is the contract with the downstream report layer.
    println!("{}", serde_json::to_string_pretty(&digest)?);

    Ok(())
}
