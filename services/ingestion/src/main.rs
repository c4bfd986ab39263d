use std::sync::Arc;

use ingestion::{
    IngestionService, clock::SystemClock, config::ServiceConfig, telemetry::init_tracing,
    transport_axum::serve_http_with_axum,
};
use store::{MemorySessionStore, ObjectSessionStore, SessionStore, StorageConfig, create_object_store};

fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ingestion configuration error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = init_tracing(config.log_format) {
        eprintln!("ingestion failed to install log subscriber: {err}");
    }

    let store: Arc<dyn SessionStore> = match &config.storage {
        StorageConfig::Memory => Arc::new(MemorySessionStore::new()),
        StorageConfig::Local { path } => match create_object_store(&config.storage) {
            Ok(backend) => {
                tracing::info!(path = %path.display(), "storing sessions on local filesystem");
                Arc::new(ObjectSessionStore::new(backend))
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to open session store");
                std::process::exit(1);
            }
        },
    };

    let service = IngestionService::new(store, Arc::new(SystemClock))
        .with_store_timeout(config.store_timeout);

    if let Err(err) = serve_http_with_axum(
        service,
        config.identity,
        &config.bind_addr,
        config.http_workers,
    ) {
        tracing::error!(error = %err, "ingestion transport failed");
        std::process::exit(1);
    }
}
