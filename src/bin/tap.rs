//! Diagnostic subscriber: prints every unit the broker publishes.
//!
//! ```text
//! tap --connect ipc:///tmp/data_streamer.ipc --prefix trades.
//! ```
//!
//! Any ZeroMQ SUB socket can do the same; this one also checks payloads.

use clap::Parser;

use market_data_streamer::{NormalizedMessage, StreamerError, Subscriber, Topic};

#[derive(Debug, Parser)]
#[command(about = "Print units published by a running data streamer")]
struct Args {
    /// Broker address (tcp://host:port or ipc://path)
    #[arg(short, long, default_value = "ipc:///tmp/data_streamer.ipc")]
    connect: String,

    /// Only receive topics starting with this prefix
    #[arg(short, long, default_value = "")]
    prefix: String,

    /// Check that each payload decodes as the kind named by its topic
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut sub = Subscriber::connect(&args.connect, &args.prefix).await?;
    log::info!("Subscribed to {} (prefix {:?})", args.connect, args.prefix);

    loop {
        let (topic, payload) = tokio::select! {
            unit = sub.recv() => match unit {
                Ok(unit) => unit,
                Err(StreamerError::Io(e)) => {
                    log::warn!("Skipping malformed unit: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        if args.validate {
            let decoded = topic
                .parse::<Topic>()
                .map_err(anyhow::Error::from)
                .and_then(|t| Ok(NormalizedMessage::decode(t.kind(), &payload)?));
            if let Err(e) = decoded {
                log::warn!("[{}] invalid payload: {}", topic, e);
            }
        }
        println!("[{}] {}", topic, payload);
    }

    log::info!("Interrupted");
    Ok(())
}
