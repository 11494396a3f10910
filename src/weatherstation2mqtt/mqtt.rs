// weatherstation2mqtt - Bridge Weather Underground style station uploads to MQTT
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::config::Configuration;
use rumqttc::{AsyncClient, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use std::error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const KEEP_ALIVE: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum PublishError {
    Serialize(serde_json::Error),
    Client(rumqttc::ClientError),
    Connection(ConnectionError),
    Timeout(Duration),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(e) => write!(f, "unable to encode payload: {}", e),
            Self::Client(e) => write!(f, "{}", e),
            Self::Connection(e) => write!(f, "{}", e),
            Self::Timeout(d) => write!(f, "broker did not respond within {:?}", d),
        }
    }
}

impl error::Error for PublishError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Serialize(e) => Some(e),
            Self::Client(e) => Some(e),
            Self::Connection(e) => Some(e),
            Self::Timeout(_) => None,
        }
    }
}

/// Payload to be published, retained, to a single topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn json<T: Serialize>(topic: impl Into<String>, value: &T) -> Result<Self, PublishError> {
        Ok(Message {
            topic: topic.into(),
            payload: serde_json::to_vec(value).map_err(PublishError::Serialize)?,
        })
    }
}

/// Publishes messages using a new broker connection for each batch.
///
/// No connection state is kept between calls: each call connects, publishes every
/// message with the retain flag set, waits for the broker to acknowledge them, and
/// disconnects. The entire exchange is bounded by `timeout`.
#[derive(Debug)]
pub struct MqttPublisher {
    client_id: String,
    timeout: Duration,
    sequence: AtomicU64,
}

impl MqttPublisher {
    pub fn new<S: Into<String>>(client_id: S, timeout: Duration) -> Self {
        MqttPublisher {
            client_id: client_id.into(),
            timeout,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish `messages` to the broker in `cfg`.
    ///
    /// An empty broker host disables publishing and this returns `Ok` without connecting.
    pub async fn publish(&self, cfg: &Configuration, messages: &[Message]) -> Result<(), PublishError> {
        if cfg.broker_host.is_empty() {
            tracing::debug!(message = "no broker configured, skipping publish", num_messages = messages.len());
            return Ok(());
        }

        if messages.is_empty() {
            return Ok(());
        }

        tokio::time::timeout(self.timeout, self.send(cfg, messages))
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))?
    }

    async fn send(&self, cfg: &Configuration, messages: &[Message]) -> Result<(), PublishError> {
        // Concurrent publishes need distinct ids or the broker drops the older session.
        let id = format!("{}-{}", self.client_id, self.sequence.fetch_add(1, Ordering::Relaxed));
        let mut opts = MqttOptions::new(id, cfg.broker_host.clone(), cfg.broker_port);
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_clean_session(true);
        if cfg.has_credentials() {
            opts.set_credentials(cfg.user.clone(), cfg.pass.clone());
        }

        let (client, mut events) = AsyncClient::new(opts, messages.len() + 1);
        for m in messages {
            client
                .publish(m.topic.clone(), QoS::AtLeastOnce, true, m.payload.clone())
                .await
                .map_err(PublishError::Client)?;
        }

        let mut acked = 0;
        while acked < messages.len() {
            if let Event::Incoming(Packet::PubAck(_)) = events.poll().await.map_err(PublishError::Connection)? {
                acked += 1;
            }
        }

        client.disconnect().await.map_err(PublishError::Client)?;
        loop {
            match events.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }

        tracing::debug!(message = "published to broker", host = %cfg.broker_host, port = cfg.broker_port, num_messages = messages.len());
        Ok(())
    }
}

/// In-process MQTT 3.1.1 broker for tests: acknowledges everything and reports each PUBLISH.
#[cfg(test)]
pub(crate) mod fake_broker {
    use std::io;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    const CONNECT: u8 = 1;
    const PUBLISH: u8 = 3;
    const PINGREQ: u8 = 12;
    const DISCONNECT: u8 = 14;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Received {
        pub topic: String,
        pub payload: Vec<u8>,
        pub retain: bool,
        pub qos: u8,
    }

    /// Start listening on an ephemeral port. Returns the port and every message published to it.
    pub(crate) async fn start() -> (u16, mpsc::UnboundedReceiver<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = serve(sock, tx).await;
                });
            }
        });

        (port, rx)
    }

    async fn serve(mut sock: TcpStream, tx: mpsc::UnboundedSender<Received>) -> io::Result<()> {
        loop {
            let header = match sock.read_u8().await {
                Ok(h) => h,
                Err(_) => return Ok(()),
            };

            let mut len = 0usize;
            let mut shift = 0;
            loop {
                let b = sock.read_u8().await?;
                len |= ((b & 0x7f) as usize) << shift;
                shift += 7;
                if b & 0x80 == 0 {
                    break;
                }
            }

            let mut body = vec![0u8; len];
            sock.read_exact(&mut body).await?;

            match header >> 4 {
                CONNECT => sock.write_all(&[0x20, 0x02, 0x00, 0x00]).await?,
                PUBLISH => {
                    let qos = (header >> 1) & 0x03;
                    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                    let topic = String::from_utf8(body[2..2 + topic_len].to_vec()).unwrap();
                    let mut offset = 2 + topic_len;
                    if qos > 0 {
                        sock.write_all(&[0x40, 0x02, body[offset], body[offset + 1]]).await?;
                        offset += 2;
                    }

                    let _ = tx.send(Received {
                        topic,
                        payload: body[offset..].to_vec(),
                        retain: header & 0x01 == 0x01,
                        qos,
                    });
                }
                PINGREQ => sock.write_all(&[0xd0, 0x00]).await?,
                DISCONNECT => return Ok(()),
                _ => {}
            }
        }
    }

    /// Wait for the next `n` messages, failing the test if they don't arrive promptly.
    pub(crate) async fn next(rx: &mut mpsc::UnboundedReceiver<Received>, n: usize) -> Vec<Received> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let msg = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for publish")
                .expect("broker stopped");
            out.push(msg);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, MqttPublisher, PublishError};
    use super::fake_broker;
    use crate::config::Configuration;
    use std::time::Duration;

    #[test]
    fn test_message_json() {
        let msg = Message::json("weather/state", &serde_json::json!({"temperature": 20.5})).unwrap();
        assert_eq!("weather/state", msg.topic);
        assert_eq!(br#"{"temperature":20.5}"#.to_vec(), msg.payload);
    }

    #[tokio::test]
    async fn test_publish_without_broker_is_noop() {
        let cfg = Configuration {
            broker_host: String::new(),
            ..Default::default()
        };

        let publisher = MqttPublisher::new("test", Duration::from_secs(1));
        let msg = Message::json("weather/state", &serde_json::json!({})).unwrap();
        assert!(publisher.publish(&cfg, &[msg]).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_unreachable_broker_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let cfg = Configuration {
            broker_host: "127.0.0.1".to_owned(),
            broker_port: port,
            ..Default::default()
        };

        let publisher = MqttPublisher::new("test", Duration::from_secs(5));
        let msg = Message::json("weather/state", &serde_json::json!({})).unwrap();
        assert!(matches!(
            publisher.publish(&cfg, &[msg]).await,
            Err(PublishError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_silent_broker_times_out() {
        // Accepts the TCP connection but never answers the MQTT handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let cfg = Configuration {
            broker_host: "127.0.0.1".to_owned(),
            broker_port: port,
            ..Default::default()
        };

        let publisher = MqttPublisher::new("test", Duration::from_millis(200));
        let msg = Message::json("weather/state", &serde_json::json!({})).unwrap();
        assert!(matches!(
            publisher.publish(&cfg, &[msg]).await,
            Err(PublishError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_retained_with_ack() {
        let (port, mut rx) = fake_broker::start().await;
        let cfg = Configuration {
            broker_host: "127.0.0.1".to_owned(),
            broker_port: port,
            user: "station".to_owned(),
            pass: "secret".to_owned(),
            ..Default::default()
        };

        let publisher = MqttPublisher::new("test", Duration::from_secs(5));
        let messages = vec![
            Message::json("weather/a", &serde_json::json!({"n": 1})).unwrap(),
            Message::json("weather/b", &serde_json::json!({"n": 2})).unwrap(),
        ];
        publisher.publish(&cfg, &messages).await.unwrap();

        let received = fake_broker::next(&mut rx, 2).await;
        assert_eq!("weather/a", received[0].topic);
        assert_eq!(br#"{"n":1}"#.to_vec(), received[0].payload);
        assert_eq!("weather/b", received[1].topic);
        assert!(received.iter().all(|m| m.retain && m.qos == 1));
    }
}
