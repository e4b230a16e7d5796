//! Publish a token event onto the token stream, the way the user service
//! does after a login. Handy for exercising the ledger without it.
//!
//! Usage:
//!   cargo run --bin publish_token -- --token <TOKEN> --user-id 7 --username alice \
//!       [--expires-in 1800] [--env dev]

use anyhow::{Context, bail};

use account_ledger::config::AppConfig;
use account_ledger::messaging::{
    RedisStreamsBroker, TokenBroker, TokenEvent, VALIDATE_TOKEN_ACTION,
};

fn get_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_arg(&args, "--env").unwrap_or_else(|| "dev".to_string());
    let config = AppConfig::load(&env).context("Failed to load configuration")?;

    let Some(token) = get_arg(&args, "--token") else {
        bail!("--token is required");
    };
    let user_id: i64 = get_arg(&args, "--user-id")
        .context("--user-id is required")?
        .parse()
        .context("--user-id must be an integer")?;
    let username = get_arg(&args, "--username").context("--username is required")?;
    let expires_in = get_arg(&args, "--expires-in")
        .map(|v| v.parse::<f64>())
        .transpose()
        .context("--expires-in must be a number of seconds")?;

    let event = TokenEvent {
        token: Some(token),
        user_id: Some(user_id),
        username: Some(username),
        token_type: Some("bearer".to_string()),
        expires_in,
        issued_at: Some(chrono::Utc::now().naive_utc().to_string()),
        action: Some(VALIDATE_TOKEN_ACTION.to_string()),
    };
    event.validate()?;
    let payload = event.to_payload()?;

    let mut broker = RedisStreamsBroker::new(&config.broker.url, config.broker.topology())?;
    broker.connect().await?;
    let id = broker.publish(&config.broker.routing_key, &payload).await?;

    println!("Published token event for user {} as {}", user_id, id);
    Ok(())
}
