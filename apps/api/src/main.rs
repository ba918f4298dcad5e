use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{
    spawn_finish_sweeper, AppointmentBookingService, AppointmentCellState, AppointmentRepository,
    InMemoryAppointmentStore, SupabaseAppointmentStore,
};
use messaging_cell::{
    ChatRoomHub, InMemoryMessageStore, MessageCipher, MessageRepository, MessagingCellState,
    MessagingService, SupabaseMessageStore,
};
use notification_cell::{
    InMemoryNotificationStore, NotificationCellState, NotificationDispatcher, NotificationRepository,
    SupabaseNotificationStore,
};
use shared_config::{AppConfig, StorageBackend};
use user_cell::{InMemoryUserDirectory, SupabaseUserDirectory, UserCellState, UserDirectory, UserService};

use crate::router::CellStates;

const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Stores {
    users: Arc<dyn UserDirectory>,
    appointments: Arc<dyn AppointmentRepository>,
    notifications: Arc<dyn NotificationRepository>,
    messages: Arc<dyn MessageRepository>,
}

fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match config.storage_backend {
        StorageBackend::Memory => {
            let users = match &config.user_seed_path {
                Some(path) => {
                    info!("Seeding users from {}", path);
                    InMemoryUserDirectory::from_seed_file(path)
                        .with_context(|| format!("failed to load user seed file {}", path))?
                }
                None => {
                    warn!("USER_SEED_PATH not set, starting with an empty user directory");
                    InMemoryUserDirectory::new()
                }
            };
            Ok(Stores {
                users: Arc::new(users),
                appointments: Arc::new(InMemoryAppointmentStore::new()),
                notifications: Arc::new(InMemoryNotificationStore::new()),
                messages: Arc::new(InMemoryMessageStore::new()),
            })
        }
        StorageBackend::Supabase => {
            anyhow::ensure!(!config.supabase_url.is_empty(), "STORAGE_BACKEND=supabase requires SUPABASE_URL");
            Ok(Stores {
                users: Arc::new(SupabaseUserDirectory::new(config)),
                appointments: Arc::new(SupabaseAppointmentStore::new(config)),
                notifications: Arc::new(SupabaseNotificationStore::new(config)),
                messages: Arc::new(SupabaseMessageStore::new(config)),
            })
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SentiVoice API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    if config.supabase_jwt_secret.is_empty() {
        warn!("SUPABASE_JWT_SECRET is empty; every authenticated request will be rejected");
    }
    info!("Using {:?} storage", config.storage_backend);

    let stores = build_stores(&config)?;

    // Background workers
    let (notifier, notification_worker) =
        NotificationDispatcher::spawn(Arc::clone(&stores.notifications), config.notification_max_retries);

    let users = Arc::new(UserService::new(Arc::clone(&stores.users)));
    let appointments = Arc::new(AppointmentBookingService::new(
        &config,
        Arc::clone(&stores.appointments),
        Arc::clone(&users),
        notifier,
    ));
    let sweeper = spawn_finish_sweeper(
        Arc::clone(&appointments),
        Duration::from_secs(config.finish_sweep_interval_secs.max(1)),
    );

    let cipher = MessageCipher::new(&config.message_encryption_key)
        .context("failed to initialise message encryption")?;
    let messaging = Arc::new(MessagingService::new(
        Arc::clone(&stores.messages),
        Arc::clone(&stores.appointments),
        cipher,
        ChatRoomHub::new(config.chat_room_capacity),
    ));

    let cells = CellStates {
        users: UserCellState {
            config: Arc::clone(&config),
            users,
        },
        appointments: AppointmentCellState {
            config: Arc::clone(&config),
            appointments,
        },
        notifications: NotificationCellState {
            config: Arc::clone(&config),
            repository: stores.notifications,
        },
        messaging: MessagingCellState {
            config: Arc::clone(&config),
            messaging,
        },
    };

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(cells)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Dropping the last service handle closes the queue; the worker stores what is left.
    sweeper.abort();
    let _ = sweeper.await;
    match tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, notification_worker).await {
        Ok(Ok(())) => info!("Notification queue drained"),
        Ok(Err(e)) => warn!("Notification worker failed: {}", e),
        Err(_) => warn!("Notification queue not drained after {:?}", NOTIFICATION_DRAIN_TIMEOUT),
    }
    info!("SentiVoice API stopped");
    Ok(())
}
