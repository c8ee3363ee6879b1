use falu::models::{MessageCreateRequest, MessagesListOptions, MessageStatus};
use falu::{ClientOptions, FaluClient, RequestOptions};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt::init();

    let client = FaluClient::new(ClientOptions::from_env()?)?;
    let messages = client.messages();

    let request = MessageCreateRequest::new("+254722000000", "transactional", "Your order has shipped");
    let options = RequestOptions::new().with_idempotency_key("order-42-shipped");

    println!("Sending message...");
    let response = messages.create(&request, Some(&options)).await?;
    println!(
        "Status: {} (request id: {:?}, cached: {:?})",
        response.status(),
        response.request_id(),
        response.cached_response()
    );
    let created = response.ensure_success()?.into_resource();
    println!("Created: {:?}", created);

    println!("Failed messages:");
    let filter = MessagesListOptions::default().with_status(MessageStatus::Failed);
    let mut all = Box::pin(messages.list_all(filter, None));
    while let Some(message) = all.next().await {
        let message = message?;
        println!("  {} -> {}", message.id, message.to);
    }

    let balances = client.money_balances().get(None).await?.ensure_success()?;
    println!("Balances: {:?}", balances.resource());

    Ok(())
}
