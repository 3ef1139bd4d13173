//! Session example: log in, list records, let the client refresh as needed
//!
//! Usage:
//!   DAYCARE_API_URL=http://localhost:8000 DAYCARE_EMAIL=... DAYCARE_PASSWORD=... \
//!     cargo run --example session

use daycare_api_client::{AuthenticatedClient, ClientConfig, ErrorKind, RefreshMode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Configuration
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(_) => ClientConfig::new("http://localhost:8000")
            .with_session_file(".daycare-session.json")
            .with_refresh_mode(RefreshMode::Coalesced),
    };
    let email = std::env::var("DAYCARE_EMAIL").unwrap_or_else(|_| "manager@daycare.test".to_string());
    let password = std::env::var("DAYCARE_PASSWORD").unwrap_or_else(|_| "password".to_string());

    println!("=== Daycare API Client Example ===");
    println!("Backend: {}", config.base_url);
    println!("Refresh mode: {:?}", config.refresh_mode);
    println!();

    let client = AuthenticatedClient::from_config(config)?;

    if client.is_authenticated()? {
        println!("✓ Reusing stored session");
    } else {
        println!("Logging in as {email}...");
        let user = client.login(&email, &password).await?;
        println!("✓ Logged in as {} ({:?})", user.email, user.role);
    }
    println!();

    // Every call below goes through the interceptor
    let api = client.api();
    match api.list_children().await {
        Ok(children) => println!("Children on record: {}", children.len()),
        Err(e) if e.kind() == ErrorKind::Unauthenticated => {
            println!("! Session could not be refreshed, log in again: {e}");
            client.logout()?;
            return Ok(());
        }
        Err(e) => println!("! Failed to list children: {e}"),
    }

    let babysitters = api.list_babysitters().await?;
    println!("Babysitters on record: {}", babysitters.len());

    let (children, schedules) = tokio::join!(api.list_children(), api.list_schedules());
    println!(
        "Concurrent fetch: {} children, {} schedules",
        children.map(|c| c.len()).unwrap_or_default(),
        schedules.map(|s| s.len()).unwrap_or_default()
    );

    println!();
    println!("Done!");

    Ok(())
}
