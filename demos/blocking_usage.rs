//! Blocking client with inline provider keys

use tokenrouter::blocking::Client;
use tokenrouter::prelude::{ClientConfig, KeyMode, Message, ProviderKeys, RequestParams};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== TokenRouter Blocking Client ===\n");

    // Provider keys are read once here and encrypted before they leave the process
    let config = ClientConfig::from_env()?.with_provider_keys(ProviderKeys::from_env());
    println!("✓ Provider keys available: {:?}", config.provider_keys);
    let client = Client::new(config)?;

    let params = RequestParams::new(vec![Message::user("Name three Rust web frameworks.")])
        .with_key_mode(KeyMode::Mixed);

    let routed = client.route(&params)?;
    println!("📤 {}", routed.content().unwrap_or_default());
    println!("  - Routed model: {:?}", routed.routed_model());

    print!("\n📡 ");
    for chunk in client.chat_completion_stream(&RequestParams::new(vec![Message::user(
        "Spell 'cargo' one letter at a time.",
    )]))? {
        print!("{}", chunk?.delta_content().unwrap_or_default());
    }
    println!();

    Ok(())
}
