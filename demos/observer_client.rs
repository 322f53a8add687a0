use std::time::{Duration, Instant};

use coap_channel::message::header::MessageType;
use coap_channel::message::option::ObserveOption;
use coap_channel::message::packet::Packet;
use coap_channel::message::request::{CoAPRequest, Method};
use coap_channel::observer::FreshnessTracker;
use coap_channel::{ChannelConfig, CoAPChannel};

/// Registers as an observer of the demo server's temperature resource,
/// prints ten fresh notifications, then deregisters with an RST.
#[tokio::main]
async fn main() {
    env_logger::init();

    let (channel, mut events) = CoAPChannel::client("127.0.0.1:5683", ChannelConfig::default())
        .await
        .unwrap();

    let mut register = CoAPRequest::new();
    register.set_method(Method::Get);
    register.set_path("sensors/temp/observe");
    register.message.header.message_type = MessageType::Confirmable;
    register.message.header.message_id = channel.next_message_id().await;
    register.message.set_token(Packet::random_token());
    register.message.set_observe_flag(ObserveOption::Register);
    channel.send(register.message).await.unwrap();

    let max_age = channel.config().observe_max_age;
    let mut freshness = FreshnessTracker::new(max_age);
    let mut printed = 0;
    while printed < 10 {
        let response = match events.responses.recv().await {
            Some(response) => response,
            None => break,
        };
        if response.is_empty_ack() {
            println!("registration acknowledged");
            continue;
        }

        let sequence = match response.message.observe_value() {
            Some(Ok(sequence)) => sequence,
            _ => continue,
        };
        if !freshness.accept(sequence, Instant::now()) {
            println!("stale notification {} dropped", sequence);
            continue;
        }

        println!(
            "[{}] {}",
            sequence,
            String::from_utf8_lossy(&response.message.payload)
        );
        printed += 1;

        if printed < 10 {
            channel
                .send(Packet::ack_empty_for(&response.message))
                .await
                .unwrap();
        } else {
            // RST tells the server to drop this observer.
            channel
                .send(Packet::rst_for(&response.message))
                .await
                .unwrap();
        }
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    channel.shutdown().await;
}
