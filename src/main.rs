use std::io;

use anyhow::Context;

use contact_intake::configuration::Settings;
use contact_intake::startup::Application;
use contact_intake::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = get_subscriber("contact_intake".into(), "info".into(), io::stdout);
    init_subscriber(subscriber);

    // Retrieve settings
    let config = Settings::get_config().context("Failed to load configuration")?;

    // Connect to the store and bind the listener, bailing out early on failure
    let application = Application::build(config).await?;

    // Serve requests and dispatch notifications until the server stops
    application.run_until_stopped().await?;

    Ok(())
}
