//! User-visible notifications, passed by injection instead of any global.
//!
//! Every caught error path must leave a visible trace before control
//! returns to the user, so handlers hold a [`Notifier`] handle and push
//! into it whenever something fails (or finishes). The ring keeps the most
//! recent entries for the frontend's notification bell.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

/// How many notifications the ring retains.
const RING_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// One user-visible notification: a short category plus the underlying
/// detail message, never just one or the other.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: Level,
    pub category: String,
    pub detail: String,
}

/// Shared notification sink. Cloning shares the ring.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    ring: Arc<RwLock<VecDeque<Notification>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: Level, category: &str, detail: &str) {
        match level {
            Level::Info => info!("{}: {}", category, detail),
            Level::Warning => warn!("{}: {}", category, detail),
            Level::Error => error!("{}: {}", category, detail),
        }

        let mut ring = self.ring.write().unwrap();
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(Notification {
            level,
            category: category.to_string(),
            detail: detail.to_string(),
        });
    }

    pub fn info(&self, category: &str, detail: &str) {
        self.push(Level::Info, category, detail);
    }

    pub fn warning(&self, category: &str, detail: &str) {
        self.push(Level::Warning, category, detail);
    }

    pub fn error(&self, category: &str, detail: &str) {
        self.push(Level::Error, category, detail);
    }

    /// Most recent notifications, oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.ring.read().unwrap().iter().cloned().collect()
    }
}
