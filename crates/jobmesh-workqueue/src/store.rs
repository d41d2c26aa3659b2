//! Directory-backed broker shared by several processes.
//!
//! Messages are stored as individual JSON files organized by state:
//! ```text
//! {root}/
//! └── {queue_name}/
//!     ├── pending/
//!     │   └── {enqueued_millis}-{uuid}.json
//!     ├── inflight/
//!     │   └── {claimed_millis}~{enqueued_millis}-{uuid}.json
//!     └── dedup/
//!         └── {dedup_key}
//! ```
//!
//! Claiming a message is an atomic rename from `pending/` to `inflight/`, so
//! only one consumer wins. Dedup markers are created with `create_new`, so
//! only one producer stores a message per key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::message::QueueMessage;
use crate::queue::{Delivery, DurableQueue, EnqueueReceipt};

const PENDING: &str = "pending";
const INFLIGHT: &str = "inflight";
const DEDUP: &str = "dedup";

/// File system based durable queue.
pub struct FileQueue {
    root: PathBuf,
    dedup_window: Duration,
    visibility_timeout: Duration,
}

impl FileQueue {
    /// Open (and create) a queue rooted at `root`.
    pub async fn open(
        root: impl Into<PathBuf>,
        dedup_window: Duration,
        visibility_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!("FileQueue initialized at {:?}", root);

        Ok(Self {
            root,
            dedup_window,
            visibility_timeout,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, queue_name: &str, state: &str) -> PathBuf {
        self.root.join(sanitize(queue_name)).join(state)
    }

    async fn ensure_dirs(&self, queue_name: &str) -> Result<(), QueueError> {
        for state in [PENDING, INFLIGHT, DEDUP] {
            fs::create_dir_all(self.dir(queue_name, state)).await?;
        }
        Ok(())
    }

    /// Create the dedup marker for `key`. Returns false if a live marker exists.
    async fn claim_dedup_key(&self, queue_name: &str, key: &str) -> Result<bool, QueueError> {
        let path = self.dir(queue_name, DEDUP).join(sanitize(key));
        let now = Utc::now().timestamp_millis();

        match create_new(&path, now.to_string().as_bytes()).await {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let created = fs::read_to_string(&path)
            .await
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(now);
        if now.saturating_sub(created) < self.dedup_window.as_millis() as i64 {
            return Ok(false);
        }

        // Expired marker: replace it and race for the new one.
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match create_new(&path, now.to_string().as_bytes()).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the marker for `key` so a later enqueue of the same tick can store it.
    async fn release_dedup_key(&self, queue_name: &str, key: &str) {
        let path = self.dir(queue_name, DEDUP).join(sanitize(key));
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to release dedup marker {:?}: {}", path, e),
        }
    }

    async fn write_atomic(&self, path: &Path, message: &QueueMessage) -> Result<(), QueueError> {
        let tmp = path.with_extension("tmp");
        let result = match write_json(&tmp, message).await {
            Ok(()) => fs::rename(&tmp, path).await.map_err(QueueError::from),
            Err(e) => Err(e),
        };
        if result.is_err() {
            discard(&tmp).await;
        }
        result
    }

    /// Delete dedup markers older than the window.
    pub async fn prune_dedup(&self, queue_name: &str) -> Result<usize, QueueError> {
        let dir = self.dir(queue_name, DEDUP);
        if !fs::try_exists(&dir).await? {
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let window = self.dedup_window.as_millis() as i64;
        let mut removed = 0;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let created = fs::read_to_string(entry.path())
                .await
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok());
            if matches!(created, Some(c) if now.saturating_sub(c) >= window)
                && fs::remove_file(entry.path()).await.is_ok()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count(&self, queue_name: &str, state: &str) -> Result<usize, QueueError> {
        let dir = self.dir(queue_name, state);
        if !fs::try_exists(&dir).await? {
            return Ok(0);
        }
        let mut count = 0;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if is_message_file(&entry.path()) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn pending_len(&self, queue_name: &str) -> Result<usize, QueueError> {
        self.count(queue_name, PENDING).await
    }

    pub async fn inflight_len(&self, queue_name: &str) -> Result<usize, QueueError> {
        self.count(queue_name, INFLIGHT).await
    }

    async fn sorted_names(&self, dir: &Path) -> Result<Vec<String>, QueueError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_message_file(&path) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl DurableQueue for FileQueue {
    fn backend(&self) -> &str {
        "file"
    }

    async fn enqueue(&self, message: QueueMessage) -> Result<EnqueueReceipt, QueueError> {
        self.ensure_dirs(&message.queue_name).await?;

        let name = format!(
            "{:013}-{}.json",
            message.enqueued_at.timestamp_millis(),
            message.id
        );
        let path = self.dir(&message.queue_name, PENDING).join(name);

        // The marker is only claimed once the staged message is on disk.
        let staged = path.with_extension("tmp");
        if let Err(e) = write_json(&staged, &message).await {
            discard(&staged).await;
            return Err(e);
        }

        let claimed = match self.claim_dedup_key(&message.queue_name, &message.dedup_key).await {
            Ok(claimed) => claimed,
            Err(e) => {
                discard(&staged).await;
                return Err(e);
            }
        };
        if !claimed {
            discard(&staged).await;
            return Ok(EnqueueReceipt::Duplicate {
                dedup_key: message.dedup_key,
            });
        }

        if let Err(e) = fs::rename(&staged, &path).await {
            discard(&staged).await;
            self.release_dedup_key(&message.queue_name, &message.dedup_key).await;
            return Err(e.into());
        }

        debug!(queue = %message.queue_name, job_name = %message.job_name, "Enqueued message {}", message.id);
        Ok(EnqueueReceipt::Enqueued {
            message_id: message.id.to_string(),
        })
    }

    async fn receive(&self, queue_name: &str) -> Result<Option<Delivery>, QueueError> {
        let pending = self.dir(queue_name, PENDING);
        let inflight = self.dir(queue_name, INFLIGHT);

        for name in self.sorted_names(&pending).await? {
            let receipt = format!("{:013}~{}", Utc::now().timestamp_millis(), name);
            let claimed = inflight.join(&receipt);

            match fs::rename(pending.join(&name), &claimed).await {
                Ok(()) => {}
                // Another consumer won the race.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }

            let content = fs::read(&claimed).await?;
            match serde_json::from_slice::<QueueMessage>(&content) {
                Ok(message) => return Ok(Some(Delivery { message, receipt })),
                Err(e) => {
                    warn!("Discarding unreadable message {:?}: {}", claimed, e);
                    fs::remove_file(&claimed).await.ok();
                }
            }
        }

        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let path = self
            .dir(&delivery.message.queue_name, INFLIGHT)
            .join(&delivery.receipt);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(QueueError::UnknownDelivery(delivery.receipt.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let queue_name = &delivery.message.queue_name;
        let claimed = self.dir(queue_name, INFLIGHT).join(&delivery.receipt);
        if !fs::try_exists(&claimed).await? {
            return Err(QueueError::UnknownDelivery(delivery.receipt.clone()));
        }

        let mut message = delivery.message.clone();
        message.attempt_count += 1;
        self.write_atomic(&claimed, &message).await?;

        let original = pending_name(&delivery.receipt);
        fs::rename(&claimed, self.dir(queue_name, PENDING).join(original)).await?;
        Ok(())
    }

    async fn recover(&self, queue_name: &str) -> Result<usize, QueueError> {
        let inflight = self.dir(queue_name, INFLIGHT);
        let pending = self.dir(queue_name, PENDING);
        let now = Utc::now().timestamp_millis();
        let timeout = self.visibility_timeout.as_millis() as i64;
        let mut recovered = 0;

        for receipt in self.sorted_names(&inflight).await? {
            let claimed_at = receipt
                .split_once('~')
                .and_then(|(ts, _)| ts.parse::<i64>().ok())
                .unwrap_or(0);
            if now.saturating_sub(claimed_at) < timeout {
                continue;
            }

            match fs::rename(inflight.join(&receipt), pending.join(pending_name(&receipt))).await {
                Ok(()) => recovered += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if recovered > 0 {
            info!(queue = queue_name, recovered, "Returned abandoned deliveries to the queue");
        }
        Ok(recovered)
    }
}

async fn write_json(path: &Path, message: &QueueMessage) -> Result<(), QueueError> {
    let content = serde_json::to_vec_pretty(message)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Best-effort removal of a partially written file.
async fn discard(path: &Path) {
    fs::remove_file(path).await.ok();
}

async fn create_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content).await?;
    file.flush().await
}

fn pending_name(receipt: &str) -> &str {
    receipt.split_once('~').map(|(_, name)| name).unwrap_or(receipt)
}

fn is_message_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Make `name` safe to use as a single path component.
fn sanitize(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| match c {
            '.' if i == 0 => '_',
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
