//! Responses API: create, continue, stream, inspect and delete

use tokenrouter::prelude::*;
use tokenrouter::{InputItemsQuery, ResponseStreamEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== TokenRouter Responses API ===\n");

    let client = Client::from_env()?;

    let first = client
        .create_response(
            &RequestParams::from_input("Tell me a three sentence bedtime story about a unicorn.")
                .with_instructions("Keep it gentle.")
                .with_store(true)
                .with_max_tokens(200),
        )
        .await?;
    println!("📤 {} [{:?}]\n{}\n", first.id, first.status, first.text());

    // Continue the conversation from the stored response
    let follow_up = client
        .create_response(
            &RequestParams::from_input("Now give the unicorn a name.")
                .with_previous_response_id(first.id.clone()),
        )
        .await?;
    println!("📤 {}\n", follow_up.text());

    // Stream a response event by event
    let mut events = client
        .create_response_stream(&RequestParams::from_input("Count to five."))
        .await?;
    while let Some(event) = events.next().await {
        match event? {
            ResponseStreamEvent::OutputTextDelta { delta, .. } => print!("{delta}"),
            ResponseStreamEvent::Completed { response } => {
                println!("\n✓ completed, usage {:?}", response.usage)
            }
            other => tracing::debug!(event = other.event_type(), "event"),
        }
    }

    let items = client
        .list_input_items(&first.id, &InputItemsQuery::default().with_limit(10))
        .await?;
    println!("\n📋 {} input items (more: {})", items.data.len(), items.has_more);

    let fetched = client.retrieve_response(&first.id).await?;
    println!("🔎 retrieved {} ({:?})", fetched.id, fetched.status);

    let deleted = client.delete_response(&first.id).await?;
    println!("🗑 deleted {}: {}", deleted.id, deleted.deleted);

    Ok(())
}
