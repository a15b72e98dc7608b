//! Client-side cart and wishlist.
//!
//! A [`LineItemStore`] keeps its lines in memory and, once connected to an
//! account, mirrors every change to the backend from a background task.
//! Mutations never wait on the network.

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::models::user::{CompositeKey, LineItem, StoreKind, SyncedItems};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sync rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("sync worker has stopped")]
    Closed,
}

/// Where a connected store writes to.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub base_url: String,
    pub token: String,
}

/// Outcome of the last write the worker attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The server holds the local state at this version.
    Synced(i64),
    /// The last write failed and was dropped.
    Failed(i64),
    /// The server copy moved on. Writes are paused until `refresh`.
    Conflict,
}

enum Command {
    Push(Vec<LineItem>),
    Refresh(oneshot::Sender<Result<SyncedItems, SyncError>>),
    Flush(oneshot::Sender<SyncStatus>),
}

pub struct LineItemStore {
    kind: StoreKind,
    items: Vec<LineItem>,
    sync: Option<mpsc::UnboundedSender<Command>>,
}

impl LineItemStore {
    /// A store that only lives in memory, as for a guest.
    pub fn local(kind: StoreKind) -> Self {
        LineItemStore {
            kind,
            items: Vec::new(),
            sync: None,
        }
    }

    /// Loads the account's copy and starts the sync worker. Must be called
    /// inside a tokio runtime.
    pub async fn connect(kind: StoreKind, target: SyncTarget) -> Result<Self, SyncError> {
        let http = reqwest::Client::new();
        let url = format!("{}{}", target.base_url.trim_end_matches('/'), kind.path());

        let initial = fetch(&http, &url, &target.token).await?;
        info!(
            "Loaded {} with {} lines at version {}",
            kind.items_field(),
            initial.items.len(),
            initial.version
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SyncWorker {
            http,
            url,
            token: target.token,
            version: initial.version,
            stale: false,
            last: SyncStatus::Synced(initial.version),
        };
        tokio::spawn(worker.run(rx));

        Ok(LineItemStore {
            kind,
            items: initial.items,
            sync: Some(tx),
        })
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn is_synced(&self) -> bool {
        self.sync.is_some()
    }

    /// Merges into the line with the same key, or appends a new line.
    /// Zero quantities are ignored and return false, since the server
    /// rejects lines below one.
    pub fn add_item(&mut self, item: LineItem) -> bool {
        if item.quantity == 0 {
            return false;
        }

        let key = item.key();
        match self.items.iter_mut().find(|line| line.matches(&key)) {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => self.items.push(item),
        }
        self.changed();
        true
    }

    /// Takes `quantity` off the line, dropping it when nothing is left.
    /// Returns false when no line has this key.
    pub fn remove_item(&mut self, key: &CompositeKey, quantity: u32) -> bool {
        let Some(index) = self.items.iter().position(|line| line.matches(key)) else {
            return false;
        };

        if self.items[index].quantity > quantity {
            self.items[index].quantity -= quantity;
        } else {
            self.items.remove(index);
        }
        self.changed();
        true
    }

    pub fn delete_item(&mut self, key: &CompositeKey) -> bool {
        let before = self.items.len();
        self.items.retain(|line| !line.matches(key));
        if self.items.len() == before {
            return false;
        }
        self.changed();
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.changed();
    }

    pub fn total_price(&self) -> f64 {
        self.items
            .iter()
            .map(|line| line.final_price * f64::from(line.quantity))
            .sum()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, line| total.saturating_add(line.quantity))
    }

    /// Waits until every change made so far has been attempted.
    pub async fn flush(&self) -> Result<SyncStatus, SyncError> {
        let Some(sync) = &self.sync else {
            return Ok(SyncStatus::Synced(0));
        };
        let (ack, done) = oneshot::channel();
        sync.send(Command::Flush(ack)).map_err(|_| SyncError::Closed)?;
        done.await.map_err(|_| SyncError::Closed)
    }

    /// Replaces the local lines with the server copy and resumes syncing.
    pub async fn refresh(&mut self) -> Result<(), SyncError> {
        let Some(sync) = &self.sync else {
            return Ok(());
        };
        let (reply, response) = oneshot::channel();
        sync.send(Command::Refresh(reply)).map_err(|_| SyncError::Closed)?;

        let fresh = response.await.map_err(|_| SyncError::Closed)??;
        self.items = fresh.items;
        Ok(())
    }

    /// Stops syncing, as on logout. The lines stay in memory.
    pub fn disconnect(&mut self) {
        self.sync = None;
    }

    fn changed(&self) {
        if let Some(sync) = &self.sync {
            if sync.send(Command::Push(self.items.clone())).is_err() {
                warn!("{} sync worker is gone, change kept locally", self.kind.items_field());
            }
        }
    }
}

struct SyncWorker {
    http: reqwest::Client,
    url: String,
    token: String,
    version: i64,
    stale: bool,
    last: SyncStatus,
}

impl SyncWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Push(mut items) => {
                    // Only the newest snapshot matters; stop at anything else.
                    let mut deferred = None;
                    while let Ok(next) = rx.try_recv() {
                        match next {
                            Command::Push(newer) => items = newer,
                            other => {
                                deferred = Some(other);
                                break;
                            }
                        }
                    }
                    self.push(items).await;
                    if let Some(command) = deferred {
                        self.handle_control(command).await;
                    }
                }
                other => self.handle_control(other).await,
            }
        }
        debug!("Sync worker for {} stopped", self.url);
    }

    async fn handle_control(&mut self, command: Command) {
        match command {
            Command::Push(items) => self.push(items).await,
            Command::Flush(ack) => {
                let _ = ack.send(self.last);
            }
            Command::Refresh(reply) => {
                let result = fetch(&self.http, &self.url, &self.token).await;
                if let Ok(fresh) = &result {
                    self.version = fresh.version;
                    self.stale = false;
                    self.last = SyncStatus::Synced(fresh.version);
                    info!("Refreshed {} at version {}", self.url, fresh.version);
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Best effort: a failed write is logged and dropped, never retried.
    async fn push(&mut self, items: Vec<LineItem>) {
        if self.stale {
            debug!("Skipping write to {} until refresh", self.url);
            return;
        }

        let body = SyncedItems {
            items,
            version: self.version,
        };
        let sent = self
            .http
            .put(&self.url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to sync {}: {}", self.url, e);
                self.last = SyncStatus::Failed(self.version);
                return;
            }
        };

        match response.status() {
            status if status.is_success() => match response.json::<SyncedItems>().await {
                Ok(stored) => {
                    self.version = stored.version;
                    self.last = SyncStatus::Synced(stored.version);
                    debug!("Synced {} at version {}", self.url, stored.version);
                }
                Err(e) => {
                    warn!("Unreadable sync response from {}: {}", self.url, e);
                    self.last = SyncStatus::Failed(self.version);
                }
            },
            StatusCode::CONFLICT => {
                warn!("{} changed elsewhere, pausing sync", self.url);
                self.stale = true;
                self.last = SyncStatus::Conflict;
            }
            status => {
                warn!("Sync to {} rejected with {}", self.url, status);
                self.last = SyncStatus::Failed(self.version);
            }
        }
    }
}

async fn fetch(http: &reqwest::Client, url: &str, token: &str) -> Result<SyncedItems, SyncError> {
    let response = http.get(url).bearer_auth(token).send().await?;
    if response.status().is_success() {
        return Ok(response.json().await?);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(SyncError::Rejected { status, message })
}
