//! Streaming from the native route with cancellation

use std::io::Write;
use std::time::Duration;
use tokenrouter::prelude::*;
use tokenrouter::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== TokenRouter Streaming ===\n");

    let client = Client::from_env()?;
    let params = RequestParams::new(vec![Message::user("Write a haiku about the borrow checker.")])
        .with_mode(RoutingMode::Latency);

    let mut stream = client.route_stream(&params).await?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(text) = chunk.delta_content() {
            print!("{text}");
            std::io::stdout().flush()?;
        }
        if let Some(model) = &chunk.routing.routed_model {
            println!("\n\n  - Routed model: {model}");
        }
    }
    // A finished stream stays finished
    assert!(stream.next().await.is_none());

    // Cancel a long answer after two seconds
    let token = CancellationToken::new();
    let long = RequestParams::new(vec![Message::user("Tell me a very long story.")]);
    let mut stream = client
        .chat_completion_stream(&long)
        .await?
        .with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        token.cancel();
    });

    let mut received = 0usize;
    while let Some(chunk) = stream.next().await {
        chunk?;
        received += 1;
    }
    println!("\n✓ Cancelled after {received} chunks");

    Ok(())
}
