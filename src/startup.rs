use std::sync::Arc;
use std::{io, net, time};

use actix_web::dev::Server;
use actix_web::http::Method;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::ingress::OriginPolicy;
use crate::notifier::{notification_channel, NotificationQueue, NotificationWorker};
use crate::routes::{health_check, preflight, submission_json_config, submit};
use crate::store::{MessageStore, PgMessageStore};

/// Deadline applied to every submission insert
pub struct InsertDeadline(pub time::Duration);

/// Application
pub struct Application {
    server: Server,
    port: u16,
    worker: NotificationWorker,
}

impl Application {
    /// Build an application based on settings
    ///
    /// Fails if the database cannot be reached or migrated.
    pub async fn build(config: Settings) -> anyhow::Result<Self> {
        // Connect to the database eagerly so that a bad connection string stops the process
        let db_pool = PgPoolOptions::new()
            .acquire_timeout(config.database.connect_timeout())
            .connect_with(config.database.db_options())
            .await
            .context("Failed to connect to the database")?;
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Connected to the database");

        Self::build_with_store(config, Arc::new(PgMessageStore::new(db_pool)))
    }

    /// Build an application based on settings and an existing message store
    pub fn build_with_store(config: Settings, store: Arc<dyn MessageStore>) -> anyhow::Result<Self> {
        // Build the notifier and the queue feeding it
        let notifier = Arc::new(config.email_client.notifier());
        let (notifications, worker) =
            notification_channel(notifier, config.email_client.queue_capacity);

        // Run the HTTP server and return its data
        let listener = net::TcpListener::bind(format!(
            "{}:{}",
            config.application.app_host, config.application.app_port
        ))?;
        let port = listener.local_addr()?.port();
        let server = run_server(
            listener,
            store,
            notifications,
            config.database.insert_timeout(),
            OriginPolicy::new(&config.application.allowed_origins),
            config.application.max_body_bytes,
        )?;
        tracing::info!(port, "Listening for contact form submissions");
        Ok(Self {
            server,
            port,
            worker,
        })
    }

    /// Get application port
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Run application until it is stopped
    ///
    /// Notifications still queued or in flight when the server stops are abandoned.
    pub async fn run_until_stopped(self) -> io::Result<()> {
        let Self { server, worker, .. } = self;
        tokio::select! {
            outcome = server => outcome,
            () = worker.run_until_stopped() => Ok(()),
        }
    }
}

/// Run the HTTP server
pub fn run_server(
    listener: net::TcpListener,
    store: Arc<dyn MessageStore>,
    notifications: NotificationQueue,
    insert_timeout: time::Duration,
    origin_policy: OriginPolicy,
    max_body_bytes: usize,
) -> io::Result<Server> {
    // Prepare data to be added the application context
    let store: web::Data<dyn MessageStore> = web::Data::from(store);
    let notifications = web::Data::new(notifications);
    let insert_deadline = web::Data::new(InsertDeadline(insert_timeout));

    // Start the HTTP server
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::resource("/submit")
                    .wrap(origin_policy.cors())
                    .app_data(submission_json_config(max_body_bytes))
                    .route(web::post().to(submit))
                    .route(web::method(Method::OPTIONS).to(preflight)),
            )
            .app_data(store.clone())
            .app_data(notifications.clone())
            .app_data(insert_deadline.clone())
    })
    .listen(listener)?
    .run())
}
