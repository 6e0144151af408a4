//! Turns detections into persisted snapshots and queued jobs
//!
//! Nothing here waits on the network. The only blocking work is the JPEG
//! write, which has to finish before a worker may pick the file up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde_json::json;
use tracing::{error, info, warn};

use sentinel_delivery::{Delivery, Job, Notifier, ShutdownReport, SubmitError, WorkerPool};
use sentinel_processing::BoundingBox;

use crate::snapshot::{SnapshotKind, SnapshotStore};

/// A confirmed motion event
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    /// Full frame with the boxes drawn on it
    pub image: RgbImage,
    pub timestamp: DateTime<Utc>,
    pub boxes: Vec<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Snapshot written and delivery queued
    Queued(PathBuf),
    /// Snapshot written, queue full, file removed
    Dropped,
    /// Snapshot could not be written, nothing queued
    NotPersisted,
}

/// Where notifications go
pub struct NotifyTarget {
    pub notifier: Arc<dyn Notifier>,
    pub topic: String,
}

pub struct EventDispatcher {
    store: SnapshotStore,
    pool: WorkerPool,
    delivery: Arc<dyn Delivery>,
    notify: Option<NotifyTarget>,
}

impl EventDispatcher {
    pub fn new(
        store: SnapshotStore,
        pool: WorkerPool,
        delivery: Arc<dyn Delivery>,
        notify: Option<NotifyTarget>,
    ) -> Self {
        Self {
            store,
            pool,
            delivery,
            notify,
        }
    }

    pub fn dispatch(&mut self, event: &DetectionEvent) -> DispatchOutcome {
        let file = match self
            .store
            .persist(SnapshotKind::Motion, &event.image, event.timestamp)
        {
            Ok(file) => file,
            Err(e) => {
                error!("failed to persist motion snapshot: {}", e);
                return DispatchOutcome::NotPersisted;
            }
        };

        info!(
            "motion detected: {} region(s), saved {}",
            event.boxes.len(),
            file.display()
        );

        let job = Job::Deliver {
            file: file.clone(),
            target: Arc::clone(&self.delivery),
        };
        if let Err(e) = self.pool.try_submit(job) {
            self.discard(e);
            return DispatchOutcome::Dropped;
        }

        // notifications only take a slot once the upload itself is queued
        if let Some(notify) = &self.notify {
            let job = Job::Notify {
                notifier: Arc::clone(&notify.notifier),
                topic: notify.topic.clone(),
                payload: event_payload(&file, event),
            };
            if let Err(e) = self.pool.try_submit(job) {
                warn!("{}, notification dropped", e);
            }
        }

        DispatchOutcome::Queued(file)
    }

    /// Persist a manual snapshot, never delivered
    pub fn save_snapshot(&mut self, image: &RgbImage, timestamp: DateTime<Utc>) -> Option<PathBuf> {
        match self.store.persist(SnapshotKind::Manual, image, timestamp) {
            Ok(path) => {
                info!("snapshot saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("failed to save snapshot: {}", e);
                None
            }
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stop accepting jobs and give workers `grace` to finish
    pub fn shutdown(self, grace: Duration) -> ShutdownReport {
        self.pool.shutdown(grace)
    }

    fn discard(&self, rejected: SubmitError) {
        warn!("{}, dropping delivery", rejected);
        if let Job::Deliver { file, .. } = rejected.into_job() {
            if let Err(e) = std::fs::remove_file(&file) {
                warn!("failed to remove {}: {}", file.display(), e);
            }
        }
    }
}

fn event_payload(file: &std::path::Path, event: &DetectionEvent) -> Vec<u8> {
    let regions: Vec<_> = event
        .boxes
        .iter()
        .map(|b| json!({ "x": b.x, "y": b.y, "width": b.width, "height": b.height }))
        .collect();

    json!({
        "event": "motion",
        "file": file.file_name().map(|n| n.to_string_lossy().into_owned()),
        "timestamp": event.timestamp.to_rfc3339(),
        "boxes": event.boxes.len(),
        "regions": regions,
    })
    .to_string()
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, Receiver, Sender};
    use sentinel_delivery::{DeliveryError, NotificationError, PoolConfig};
    use std::path::Path;
    use std::sync::Mutex;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sentinel-dispatch-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn event() -> DetectionEvent {
        DetectionEvent {
            image: RgbImage::new(32, 32),
            timestamp: Utc::now(),
            boxes: vec![BoundingBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            }],
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<PathBuf>>);

    impl Delivery for Recording {
        fn deliver(&self, file: &Path) -> Result<(), DeliveryError> {
            self.0.lock().unwrap().push(file.to_path_buf());
            Ok(())
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    struct Gated {
        started: Sender<()>,
        gate: Receiver<()>,
    }

    impl Delivery for Gated {
        fn deliver(&self, _file: &Path) -> Result<(), DeliveryError> {
            let _ = self.started.send(());
            let _ = self.gate.recv();
            Ok(())
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    #[derive(Default)]
    struct Payloads(Mutex<Vec<Vec<u8>>>);

    impl Notifier for Payloads {
        fn publish(&self, _topic: &str, payload: &[u8]) -> Result<(), NotificationError> {
            self.0.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn describe(&self) -> String {
            "payloads".to_string()
        }
    }

    #[test]
    fn test_dispatch_persists_and_delivers() {
        let dir = temp_dir("deliver");
        let delivery = Arc::new(Recording::default());
        let notifier = Arc::new(Payloads::default());
        let mut dispatcher = EventDispatcher::new(
            SnapshotStore::new(&dir).unwrap(),
            WorkerPool::new(PoolConfig::default()).unwrap(),
            delivery.clone(),
            Some(NotifyTarget {
                notifier: notifier.clone(),
                topic: "motion".to_string(),
            }),
        );

        let file = match dispatcher.dispatch(&event()) {
            DispatchOutcome::Queued(file) => file,
            other => panic!("expected a queued delivery, got {:?}", other),
        };
        dispatcher.shutdown(Duration::from_secs(5));

        assert_eq!(delivery.0.lock().unwrap().as_slice(), &[file.clone()]);
        assert!(!file.exists());

        let payloads = notifier.0.lock().unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&payloads[0]).unwrap();
        assert_eq!(payload["event"], "motion");
        assert_eq!(payload["boxes"], 1);
        assert_eq!(payload["regions"][0]["height"], 4);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_full_queue_removes_snapshot() {
        let dir = temp_dir("full");
        let (started_tx, started_rx) = bounded(4);
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let mut dispatcher = EventDispatcher::new(
            SnapshotStore::new(&dir).unwrap(),
            WorkerPool::new(PoolConfig {
                workers: 1,
                queue_size: 1,
            })
            .unwrap(),
            Arc::new(Gated {
                started: started_tx,
                gate: gate_rx,
            }),
            None,
        );

        assert!(matches!(dispatcher.dispatch(&event()), DispatchOutcome::Queued(_)));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(dispatcher.dispatch(&event()), DispatchOutcome::Queued(_)));
        assert_eq!(dispatcher.dispatch(&event()), DispatchOutcome::Dropped);

        // only the two queued snapshots remain on disk
        let remaining = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(remaining, 2);

        drop(gate_tx);
        dispatcher.shutdown(Duration::from_secs(5));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_notification_never_takes_the_upload_slot() {
        let dir = temp_dir("burst");
        let (started_tx, started_rx) = bounded(4);
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let notifier = Arc::new(Payloads::default());
        let mut dispatcher = EventDispatcher::new(
            SnapshotStore::new(&dir).unwrap(),
            WorkerPool::new(PoolConfig {
                workers: 1,
                queue_size: 2,
            })
            .unwrap(),
            Arc::new(Gated {
                started: started_tx,
                gate: gate_rx,
            }),
            Some(NotifyTarget {
                notifier: notifier.clone(),
                topic: "motion".to_string(),
            }),
        );

        // first upload is running, its notification waits in the queue
        assert!(matches!(dispatcher.dispatch(&event()), DispatchOutcome::Queued(_)));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // the last slot goes to the second upload, its notification is dropped
        assert!(matches!(dispatcher.dispatch(&event()), DispatchOutcome::Queued(_)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);

        drop(gate_tx);
        dispatcher.shutdown(Duration::from_secs(5));
        assert_eq!(notifier.0.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_manual_snapshot_is_kept() {
        let dir = temp_dir("manual");
        let delivery = Arc::new(Recording::default());
        let mut dispatcher = EventDispatcher::new(
            SnapshotStore::new(&dir).unwrap(),
            WorkerPool::new(PoolConfig::default()).unwrap(),
            delivery.clone(),
            None,
        );

        let path = dispatcher
            .save_snapshot(&RgbImage::new(8, 8), Utc::now())
            .unwrap();
        dispatcher.shutdown(Duration::from_secs(5));

        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("snapshot_"));
        assert!(delivery.0.lock().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
