use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::dedlog::consts;
use crate::dedlog::sanitizer::{Sanitizer, WithCollapseSpaces};

/// Log entry for deduplication
pub struct LogEntry {
    err: Option<String>,
    reason: String,
    extra: Option<String>,
    count: usize,
}

impl LogEntry {
    fn new(err: Option<String>, extra: Option<String>, reason: String) -> Self {
        Self {
            err,
            reason,
            extra,
            count: 1,
        }
    }
}

// Installed by start_dedup_logger; None while no flusher is running.
static ERR_CH: once_cell::sync::Lazy<Mutex<Option<mpsc::Sender<LogEntry>>>> =
    once_cell::sync::Lazy::new(|| Mutex::new(None));

fn get_err_ch() -> Option<mpsc::Sender<LogEntry>> {
    ERR_CH.try_lock().ok().and_then(|guard| guard.clone())
}

fn set_err_ch(tx: Option<mpsc::Sender<LogEntry>>) {
    if let Ok(mut guard) = ERR_CH.lock() {
        *guard = tx;
    }
}

// Uninstalls `tx` unless a newer flusher replaced it already.
fn clear_err_ch(tx: &mpsc::Sender<LogEntry>) {
    if let Ok(mut guard) = ERR_CH.lock() {
        if guard.as_ref().is_some_and(|cur| cur.same_channel(tx)) {
            *guard = None;
        }
    }
}

/// Records an error without blocking the caller.
///
/// Identical reasons are folded and flushed once per window with a count.
/// Without a running flusher the entry is logged directly at warn level.
pub fn err(err: Option<&dyn std::error::Error>, extra: Option<&str>, reason: &str) {
    let entry = LogEntry::new(
        err.map(|e| e.to_string()),
        extra.map(|s| s.to_string()),
        reason.to_string(),
    );
    match get_err_ch() {
        Some(tx) => {
            // Dropped when the buffer is full: the window already has plenty
            let _ = tx.try_send(entry);
        }
        None => warn!(
            component = consts::COMPONENT,
            err = entry.err.as_deref().unwrap_or(""),
            extra = entry.extra.as_deref().unwrap_or(""),
            "{}", entry.reason
        ),
    }
}

/// Runs the deduplicated logger until the token is cancelled.
pub async fn start_dedup_logger(ctx: CancellationToken, window: Duration) {
    let (tx, mut rx) = mpsc::channel(consts::CHANNEL_CAPACITY);
    set_err_ch(Some(tx.clone()));
    let mut cur_map: DashMap<String, LogEntry> = DashMap::new();

    let mut interval = tokio::time::interval(window);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let sanitizer = Sanitizer::new(WithCollapseSpaces(true));

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                flush(&sanitizer, &cur_map);
                clear_err_ch(&tx);
                break;
            }
            entry = rx.recv() => {
                if let Some(entry) = entry {
                    // Fold on the sanitized error as well, so different
                    // endpoints failing the same way share one line
                    let fold_key = format!(
                        "{}|{}",
                        entry.reason,
                        entry.err.as_deref().map(|e| sanitizer.sanitize(e)).unwrap_or_default()
                    );
                    if let Some(mut existing) = cur_map.get_mut(&fold_key) {
                        existing.count += 1;
                    } else {
                        cur_map.insert(fold_key, entry);
                    }
                }
            }
            _ = interval.tick() => {
                let prev = std::mem::take(&mut cur_map);
                flush(&sanitizer, &prev);
            }
        }
    }
}

fn flush(sanitizer: &Sanitizer, entries: &DashMap<String, LogEntry>) {
    for entry in entries.iter() {
        let err = entry.err.as_deref().map(|e| sanitizer.sanitize(e)).unwrap_or_default();
        let extra = entry.extra.as_deref().unwrap_or("");
        error!(
            component = consts::COMPONENT,
            count = entry.count,
            err = %err,
            extra = %extra,
            "{}", entry.reason
        );
    }
}
