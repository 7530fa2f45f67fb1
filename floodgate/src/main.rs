use clap::Parser;
use floodgate::bus::{self, BusEventSource, BusQueueStore};
use floodgate::config::Config;
use floodgate::manager::RequestManager;
use floodgate::mem::{loopback_clients, MemEventSource, MemQueueStore};
use floodgate::request::LowData;
use saltbus::client::BusClient;
use saltbus::events::EventStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Throttled request gateway for the salt master
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the service configuration document
    #[arg(long)]
    config: PathBuf,
    /// Override the master API endpoint from the config
    #[arg(long)]
    api_url: Option<String>,
    /// Override the event bus endpoint from the config
    #[arg(long)]
    event_url: Option<String>,
    /// DEBUG: run against in-memory collaborators instead of the master,
    /// seeding one request per configured queue
    #[arg(long, action)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(url) = args.api_url {
        config.api_url = Some(url);
    }
    if let Some(url) = args.event_url {
        config.event_url = Some(url);
    }

    if let Some(addr) = config.metrics_listen {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        log::info!("metrics listening on {addr}");
    }

    let manager = if args.dry_run {
        log::info!("dry run: using in-memory collaborators");
        let events = MemEventSource::new();
        let manager = RequestManager::new(
            config.input_queues.clone(),
            loopback_clients(&events),
            Box::new(MemQueueStore::new()),
            Box::new(events.clone()),
        );
        for queue in &config.input_queues {
            let request_id = manager
                .initialize_request(&queue.name, LowData::new("runner", "test.ping"))
                .await?;
            log::info!("seeded request {request_id} on queue {:?}", queue.name);
        }
        manager
    } else {
        let api_url = config
            .api_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("api_url is required (config or --api-url)"))?;
        let event_url = config
            .event_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("event_url is required (config or --event-url)"))?;

        let bus = Arc::new(BusClient::new(api_url, config.api_token.clone())?);
        let store = BusQueueStore::new(bus.clone(), config.queue_backend.clone());
        let events = BusEventSource::new(EventStream::new(event_url)?);
        RequestManager::new(
            config.input_queues.clone(),
            bus::client_map(&bus),
            Box::new(store),
            Box::new(events),
        )
    };

    run(manager, config.loop_interval).await
}

/// Drive the manager: poll then update on every tick, forever. Tick faults
/// are logged and retried on the next interval.
async fn run(mut manager: RequestManager, loop_interval: f64) -> anyhow::Result<()> {
    log::info!("starting driver loop at {loop_interval}s per tick");
    let mut tick = tokio::time::interval(Duration::from_secs_f64(loop_interval));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(err) = manager.poll().await {
                    log::error!("poll tick failed: {err}");
                }
                if let Err(err) = manager.update().await {
                    log::error!("update tick failed: {err}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
