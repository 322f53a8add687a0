use std::time::Duration;

use coap_channel::block::split_payload;
use coap_channel::message::header::MessageType;
use coap_channel::message::option::CoAPOption;
use coap_channel::message::packet::Packet;
use coap_channel::message::request::{CoAPRequest, Method};
use coap_channel::{ChannelConfig, CoAPChannel};

/// Uploads a payload larger than one block with a Block1 transfer,
/// sending each block only after the previous one is acknowledged.
#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ChannelConfig {
        block_size: 16,
        ..ChannelConfig::default()
    };
    let (channel, mut events) = CoAPChannel::client("127.0.0.1:5683", config)
        .await
        .unwrap();

    let payload = b"this payload spans three separate blocks".to_vec();
    let token = Packet::random_token();
    let blocks = split_payload(&payload, channel.config().block_size).unwrap();
    println!("uploading {} bytes in {} blocks", payload.len(), blocks.len());

    for (block, fragment) in &blocks {
        let mut request = CoAPRequest::new();
        request.set_method(Method::Put);
        request.set_path("largedata/blockput");
        request.message.header.message_type = MessageType::Confirmable;
        request.message.header.message_id = channel.next_message_id().await;
        request.message.set_token(token.clone());
        request.message.set_block_value(CoAPOption::Block1, *block);
        request.message.payload = fragment.to_vec();
        channel.send(request.message).await.unwrap();

        let ack = tokio::time::timeout(Duration::from_secs(10), events.responses.recv())
            .await
            .expect("no acknowledgment within 10s")
            .expect("channel closed");
        match ack.message.block_value(CoAPOption::Block1) {
            Some(Ok(echoed)) => println!("block {} acknowledged", echoed.num),
            _ => println!("unexpected response {:?}", ack.message.header.code),
        }
    }

    println!("upload complete");
    channel.shutdown().await;
}
