//! Native routing, chat completions and legacy completions side by side

use tokenrouter::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== TokenRouter Basic Usage ===\n");

    let client = Client::from_env()?;
    println!("✓ Client ready for {}", client.config().base_url);

    let health = client.health_check().await?;
    println!("✓ Service status: {:?}", health.status);

    let models = client.list_models().await?;
    println!("✓ {} models available", models.len());
    for model in models.iter().take(5) {
        println!("  - {} ({})", model.id, model.provider);
    }

    let params = RequestParams::new(vec![
        Message::developer("You are a concise assistant."),
        Message::user("Explain ownership in Rust in two sentences."),
    ])
    .with_mode(RoutingMode::Balanced)
    .with_max_tokens(120);

    // Native route: the router picks the model and reports what it did
    let routed = client.route(&params).await?;
    println!("\n📤 /route: {}", routed.content().unwrap_or_default());
    println!("  - Routed model: {:?}", routed.routed_model());
    println!("  - Provider: {:?}", routed.routing.routed_provider);
    println!("  - Cost (USD): {:?}", routed.cost_usd());
    println!("  - Latency (ms): {:?}", routed.routing.latency_ms);

    // Same conversation through the OpenAI-compatible endpoint
    let chat = client.chat_completion(&params).await?;
    println!("\n📤 /v1/chat/completions ({}): {}", chat.model, chat.content().unwrap_or_default());
    if let Some(usage) = chat.usage {
        println!("  - Total tokens: {}", usage.total_tokens);
    }

    // Legacy completions come back in the provider's raw shape
    let legacy = client
        .completion(&RequestParams::from_prompt("Say this is a test").with_max_tokens(7))
        .await?;
    println!("\n📤 /v1/completions: {}", legacy["choices"][0]["text"]);

    // Bad input is rejected before any request is made
    let err = client
        .chat_completion(&params.clone().with_key_mode(KeyMode::Inline))
        .await
        .unwrap_err();
    println!("\n⚠ Rejected locally: {err} (kind {:?})", err.kind());

    Ok(())
}
