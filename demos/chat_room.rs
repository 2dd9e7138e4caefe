use std::error::Error;

use secrecy::SecretString;
use storefront_sdk::realtime::client::ChannelClient;
use storefront_sdk::realtime::config::ChannelConfig;
use storefront_sdk::realtime::proto::{ClientCommand, CONNECTED_EVENT};
use storefront_sdk::realtime::session::{ChannelEvent, EventFeed};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let access_token = "REPLACE_WITH_ACCESS_TOKEN".to_string();
    let room_id = 1;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = ChannelClient::new(ChannelConfig::chat_room("localhost", room_id))?;
        let mut connected = client.subscribe(CONNECTED_EVENT);
        let mut feed = EventFeed::attach(&client);
        client.connect(SecretString::new(access_token));

        if connected.recv().await.is_some() {
            client.send_command(&ClientCommand::Typing)?;
            client.send_command(&ClientCommand::ChatMessage {
                content: "Hi, is this still available?".to_string(),
            })?;
        }
        client.unsubscribe(connected);

        while let Some(event) = feed.recv().await {
            match event {
                ChannelEvent::RoomMessage(message) => {
                    println!(
                        "[{}] {}: {}",
                        message.created_at, message.sender_name, message.content
                    );
                }
                ChannelEvent::Typing(notice) => println!("{} is typing", notice.username),
                ChannelEvent::Disconnected => println!("room connection lost"),
                _ => {}
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
