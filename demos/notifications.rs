use std::error::Error;

use secrecy::SecretString;
use storefront_sdk::realtime::client::ChannelClient;
use storefront_sdk::realtime::config::ChannelConfig;
use storefront_sdk::realtime::session::{ChannelEvent, EventFeed};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let access_token = "REPLACE_WITH_ACCESS_TOKEN".to_string();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = ChannelClient::new(ChannelConfig::notifications("localhost"))?;
        let mut feed = EventFeed::attach(&client);
        client.connect(SecretString::new(access_token));

        while let Some(event) = feed.recv().await {
            match event {
                ChannelEvent::Connected => println!("connected"),
                ChannelEvent::Disconnected => {
                    println!("disconnected, state={:?}", client.state());
                }
                ChannelEvent::Notification(data) => {
                    println!(
                        "notification unread={} payload={data}",
                        feed.unread_notifications()
                    );
                }
                ChannelEvent::Order(data) => println!("order update {data}"),
                ChannelEvent::Wishlist(data) => println!("wishlist match {data}"),
                ChannelEvent::Error(data) => eprintln!("channel error {data}"),
                _ => {}
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
