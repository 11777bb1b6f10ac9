use std::{env, str::FromStr, sync::Arc, time::Duration};

use cancelq_core::{CancellableQueue, CancellationToken, GetError, QueueBuilder, QueueConfig};
use tracing::{info, warn};

use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = QueueConfig {
        capacity: env_or("PIPELINE_CAPACITY", 10),
        name: Some("pipeline".into()),
    };
    let items: u64 = env_or("PIPELINE_ITEMS", 100);
    let idle = Duration::from_millis(env_or("PIPELINE_IDLE_TIMEOUT_MS", 500));

    info!(capacity = config.capacity, items, "starting pipeline demo");

    // Ctrl-C cancels the root token, which closes the queue.
    let root = CancellationToken::new();
    tokio::spawn({
        let root = root.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling");
                root.cancel();
            }
        }
    });

    let queue: Arc<CancellableQueue<u64>> =
        Arc::new(QueueBuilder::from_config(config).parent(&root).build());

    let producer = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            for item in 1..=items {
                if let Err(err) = queue.add(item).await {
                    warn!(%err, item, "producer stopped early");
                    return;
                }
            }
            if let Err(err) = queue.close() {
                warn!(%err, "queue was already closed");
            }
            info!("producer finished");
        }
    });

    let consumer = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            let mut total = 0u64;
            loop {
                match queue.get_with_timeout(idle).await {
                    Ok(item) => {
                        info!(item, "consumer received item");
                        total += item;
                    }
                    Err(GetError::Timeout) => {
                        info!(idle_ms = idle.as_millis(), "consumer idle");
                    }
                    Err(err) => {
                        info!(%err, "consumer done");
                        return total;
                    }
                }
            }
        }
    });

    let _ = producer.await;
    match consumer.await {
        Ok(total) => info!(total, "pipeline finished"),
        Err(err) => warn!(%err, "consumer task failed"),
    }
}
