//! Topics CLI
//!
//! Publishes messages to a topic or follows a topic and prints what arrives.
//! Credentials and pool settings come from the environment (see
//! `TopicsConfig::from_env`).

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_topics::{SubscribeRequest, TopicClient, TopicEvent, TopicsConfig};
use eyre::{Result, WrapErr};
use tracing::info;

#[derive(Parser)]
#[command(name = "topics-cli")]
#[command(about = "Publish to and subscribe to Momento topics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a message to a topic
    Publish {
        #[arg(short, long)]
        cache: String,

        #[arg(short, long)]
        topic: String,

        #[arg(short, long)]
        message: String,

        /// Publish the message this many times
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },

    /// Subscribe to a topic and print items as they arrive
    Subscribe {
        #[arg(short, long)]
        cache: String,

        #[arg(short, long)]
        topic: String,

        /// Exit after this many items
        #[arg(short, long)]
        limit: Option<u64>,

        /// Resume from this sequence number instead of the live tail
        #[arg(long)]
        resume_at: Option<u64>,

        /// Also print heartbeats and discontinuities
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let config = TopicsConfig::from_env().wrap_err("Failed to load topics configuration")?;
    let client = TopicClient::connect(config).wrap_err("Failed to create topic client")?;

    let result = run(&client, cli.command).await;
    client.close().await;
    result
}

async fn run(client: &TopicClient, command: Commands) -> Result<()> {
    match command {
        Commands::Publish {
            cache,
            topic,
            message,
            count,
        } => {
            for i in 0..count {
                client
                    .publish(&cache, &topic, message.as_str())
                    .await
                    .wrap_err_with(|| format!("Failed to publish message {} of {}", i + 1, count))?;
            }
            info!(cache = %cache, topic = %topic, count, "Published");
        }

        Commands::Subscribe {
            cache,
            topic,
            limit,
            resume_at,
            verbose,
        } => {
            let mut request = SubscribeRequest::new(&cache, &topic);
            if let Some(sequence_number) = resume_at {
                request = request.with_resume_at(sequence_number, 0);
            }
            let mut subscription = client
                .subscribe(request)
                .await
                .wrap_err_with(|| format!("Failed to subscribe to {}/{}", cache, topic))?;
            info!(cache = %cache, topic = %topic, "Subscribed");

            let mut received = 0u64;
            while limit.is_none_or(|limit| received < limit) {
                let event = tokio::select! {
                    event = subscription.event() => event.wrap_err("Subscription failed")?,
                    _ = tokio::signal::ctrl_c() => break,
                };
                match event {
                    TopicEvent::Item(item) => {
                        println!("[{}] {}", item.sequence_number, item.value);
                        received += 1;
                    }
                    TopicEvent::Discontinuity(d) if verbose => {
                        println!(
                            "-- discontinuity: {} -> {}",
                            d.last_sequence_number, d.new_sequence_number
                        );
                    }
                    TopicEvent::Heartbeat if verbose => println!("-- heartbeat"),
                    _ => {}
                }
            }
            info!(received, "Subscription finished");
        }
    }

    Ok(())
}
