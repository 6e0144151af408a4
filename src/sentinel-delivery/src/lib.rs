//! sentinel-delivery - Best-effort upload and notification for Sentinel
//!
//! Snapshots are pushed over HTTP or SFTP and motion events are published
//! over MQTT. All of it runs on a small worker pool so the detection loop
//! never waits on the network.

pub mod error;
pub mod http;
pub mod method;
pub mod mqtt;
pub mod pool;
pub mod sftp;

pub use error::{DeliveryError, NotificationError};
pub use http::HttpDelivery;
pub use method::{Delivery, DeliveryMethod};
pub use mqtt::{parse_broker, MqttNotifier, Notifier, DEFAULT_MQTT_PORT};
pub use pool::{Job, PoolConfig, PoolStats, ShutdownReport, SubmitError, WorkerPool};
pub use sftp::SftpDelivery;
