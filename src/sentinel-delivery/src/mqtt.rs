//! MQTT motion notifications

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use tracing::debug;

use crate::error::NotificationError;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes small event payloads to a message broker
pub trait Notifier: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NotificationError>;

    fn describe(&self) -> String;
}

/// Split `host[:port]`, defaulting the port
pub fn parse_broker(broker: &str) -> Result<(String, u16), NotificationError> {
    let broker = broker.trim();
    if broker.is_empty() {
        return Err(NotificationError::InvalidBroker("empty broker address".to_string()));
    }

    match broker.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| NotificationError::InvalidBroker(format!("bad port in {:?}", broker)))?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(NotificationError::InvalidBroker(format!("missing host in {:?}", broker))),
        None => Ok((broker.to_string(), DEFAULT_MQTT_PORT)),
    }
}

/// One short-lived connection per publish, QoS 1
#[derive(Debug)]
pub struct MqttNotifier {
    host: String,
    port: u16,
    ack_timeout: Duration,
    sequence: AtomicU64,
}

impl MqttNotifier {
    pub fn new(broker: &str) -> Result<Self, NotificationError> {
        let (host, port) = parse_broker(broker)?;
        Ok(Self {
            host,
            port,
            ack_timeout: ACK_TIMEOUT,
            sequence: AtomicU64::new(0),
        })
    }

    fn client_id(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("sentinel-{}-{}", std::process::id(), n)
    }
}

impl Notifier for MqttNotifier {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NotificationError> {
        let mut options = MqttOptions::new(self.client_id(), self.host.as_str(), self.port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, mut connection) = Client::new(options, 10);
        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| NotificationError::Publish(e.to_string()))?;

        let deadline = Instant::now() + self.ack_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NotificationError::Timeout(self.ack_timeout));
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::PubAck(_)))) => break,
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(NotificationError::Connection(e.to_string())),
                Err(_) => return Err(NotificationError::Timeout(self.ack_timeout)),
            }
        }

        debug!("published {} bytes to {} on {}:{}", payload.len(), topic, self.host, self.port);
        let _ = client.disconnect();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_default_port() {
        assert_eq!(parse_broker("localhost").unwrap(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_parse_broker_with_port() {
        assert_eq!(
            parse_broker("broker.local:8883").unwrap(),
            ("broker.local".to_string(), 8883)
        );
    }

    #[test]
    fn test_parse_broker_rejects_garbage() {
        assert!(parse_broker("").is_err());
        assert!(parse_broker(":1883").is_err());
        assert!(parse_broker("host:notaport").is_err());
        assert!(parse_broker("host:70000").is_err());
    }

    #[test]
    fn test_client_ids_are_unique() {
        let notifier = MqttNotifier::new("localhost").unwrap();
        assert_ne!(notifier.client_id(), notifier.client_id());
        assert_eq!(notifier.describe(), "mqtt://localhost:1883");
    }
}
