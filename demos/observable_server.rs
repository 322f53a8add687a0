use std::time::Duration;

use coap_channel::message::option::APPLICATION_JSON;
use coap_channel::message::packet::Packet;
use coap_channel::{ChannelConfig, CoAPChannel};

/// Serves one observable resource and pushes a fresh reading to every
/// registered observer once a second.
#[tokio::main]
async fn main() {
    env_logger::init();

    let (channel, mut events) = CoAPChannel::server("0.0.0.0:5683", ChannelConfig::default())
        .await
        .unwrap();
    let path = "sensors/temp/observe";
    channel.add_observable_resource(path).await;
    println!("listening on {}", channel.local_addr().unwrap());

    let mut readings = tokio::time::interval(Duration::from_secs(1));
    let mut temp = 20i32;
    loop {
        tokio::select! {
            Some(request) = events.requests.recv() => {
                let peer = request.source.unwrap();
                if request.is_observe() && channel.add_resource_observer(&request).await {
                    println!("observer registered: {}", peer);
                    channel
                        .send_to(Packet::ack_empty_for(&request.message), peer)
                        .await
                        .unwrap();
                } else {
                    println!("ignoring {} from {}", request.path(), peer);
                }
            }
            Some(err) = events.errors.recv() => {
                eprintln!("channel error: {}", err);
            }
            _ = readings.tick() => {
                temp += 1;
                let payload = format!("{{\"temp\":{}}}", temp).into_bytes();
                match channel.notify_observers(path, payload, Some(APPLICATION_JSON)).await {
                    Ok(sent) if sent > 0 => println!("notified {} observers", sent),
                    Ok(_) => {}
                    Err(err) => eprintln!("notify failed: {}", err),
                }
            }
        }
    }
}
