//! Interactive 42 login from the terminal.
//! Run with:
//! `FORTYTWO_CLIENT_ID=… FORTYTWO_CLIENT_SECRET=… FORTYTWO_CALLBACK_URL=… cargo run --example fortytwo_login`
//!
//! Open the printed URL, authorize, then paste the full URL the browser was
//! redirected to.

use std::sync::Arc;

use oauth42::social::fortytwo;
use oauth42::{InMemoryStateStore, LoginFlow, ReqwestHttpClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oauth42=debug")))
        .init();

    let config = fortytwo::from_env()?;
    let client = fortytwo::client(config, ReqwestHttpClient::new()?);
    let flow = LoginFlow::new(client, Arc::new(InMemoryStateStore::new()));

    let session = LoginFlow::<ReqwestHttpClient, InMemoryStateStore>::new_session_id();
    let redirect = flow.begin(&session, None).await?;
    println!("Open this URL in a browser:\n\n  {}\n", redirect);
    println!("Paste the callback URL you were redirected to:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let query = line.trim().split_once('?').map(|(_, q)| q).unwrap_or(line.trim());

    match flow.complete(&session, query).await {
        Ok(identity) => {
            println!("Logged in as {} (42 id {})", identity.username.as_deref().unwrap_or("?"), identity.external_id);
            if let Some(email) = identity.email {
                println!("email: {}", email);
            }
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            tracing::error!(error_kind = %e.kind(), "login failed: {}", e);
        }
    }
    Ok(())
}
