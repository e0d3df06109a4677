//! topiclink-tail - print topic snapshots as JSON lines
//!
//! Usage:
//!   topiclink-tail [--origin http://host:port] [--path /ws] [--scroll N] TOPIC...
//!
//! Every other setting comes from `TOPICLINK_*` environment variables.
//! Ctrl-C closes the socket cleanly before exiting.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use topiclink::{LinkConfig, LinkError, LinkEvent, LinkResult};

const FLAGS: [&str; 3] = ["--origin", "--path", "--scroll"];

#[tokio::main]
async fn main() -> LinkResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("topiclink=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let topics = positional(&args);
    if topics.is_empty() {
        return Err(LinkError::Config(
            "usage: topiclink-tail [--origin URL] [--path PATH] [--scroll N] TOPIC...".to_string(),
        ));
    }

    let mut config = LinkConfig::from_env()?;
    if let Some(origin) = parse_arg_string(&args, "--origin") {
        config.origin = origin;
    }
    if let Some(path) = parse_arg_string(&args, "--path") {
        config = config.with_path(path);
    }
    let scroll = match parse_arg_string(&args, "--scroll") {
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| LinkError::Config(format!("--scroll must be a number, got '{}'", raw)))?,
        ),
        None => None,
    };

    let link = topiclink::init_link(config)?;
    info!("{} {} tailing {:?} on {}", topiclink::NAME, topiclink::VERSION, topics, link.url());

    let stop = Arc::new(Notify::new());
    let notify = Arc::clone(&stop);
    ctrlc::set_handler(move || notify.notify_one())
        .map_err(|e| LinkError::Config(format!("cannot install Ctrl-C handler: {}", e)))?;

    let mut events = link.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                LinkEvent::LoginRequired => warn!("server requires a fresh login"),
                LinkEvent::Invalidated => warn!("client data invalidated"),
                other => info!(?other, "link event"),
            }
        }
    });

    for topic in topics {
        let subscription = match scroll {
            Some(max_len) => link.subscribe_scroll(topic, max_len),
            None => link.subscribe(topic),
        };
        tokio::spawn(async move {
            let mut updates = subscription.updates();
            while let Some(snapshot) = updates.next().await {
                let line = json!({
                    "topic": subscription.topic(),
                    "ready": snapshot.ready,
                    "value": snapshot.value,
                });
                println!("{}", line);
            }
        });
    }

    stop.notified().await;
    info!("shutting down");
    link.shutdown().await;
    Ok(())
}

/// Arguments that are neither flags nor flag values
fn positional(args: &[String]) -> Vec<String> {
    let mut topics = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else {
            topics.push(arg.clone());
        }
    }
    topics
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
