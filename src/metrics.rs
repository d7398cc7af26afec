//! Process-wide counters for world activity.
use std::sync::atomic::{AtomicU64, Ordering};

static CHAT_MESSAGES: AtomicU64 = AtomicU64::new(0);
static CHAT_DROPPED: AtomicU64 = AtomicU64::new(0);
static CONSTRUCTIONS: AtomicU64 = AtomicU64::new(0);
static RELINQUISHES: AtomicU64 = AtomicU64::new(0);
static ABANDONS_EXECUTED: AtomicU64 = AtomicU64::new(0);
static ABANDONS_SKIPPED: AtomicU64 = AtomicU64::new(0);
static STORAGE_WRITE_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_chat_messages() {
    CHAT_MESSAGES.fetch_add(1, Ordering::Relaxed);
}

/// A push from a sender that was not a channel member.
pub fn inc_chat_dropped() {
    CHAT_DROPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_constructions() {
    CONSTRUCTIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_relinquishes() {
    RELINQUISHES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_abandons_executed() {
    ABANDONS_EXECUTED.fetch_add(1, Ordering::Relaxed);
}

/// A due abandonment whose site was re-claimed or cancelled in the meantime.
pub fn inc_abandons_skipped() {
    ABANDONS_SKIPPED.fetch_add(1, Ordering::Relaxed);
}

/// Best-effort write that failed and was swallowed.
pub fn inc_storage_write_failures() {
    STORAGE_WRITE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub chat_messages: u64,
    pub chat_dropped: u64,
    pub constructions: u64,
    pub relinquishes: u64,
    pub abandons_executed: u64,
    pub abandons_skipped: u64,
    pub storage_write_failures: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        chat_messages: CHAT_MESSAGES.load(Ordering::Relaxed),
        chat_dropped: CHAT_DROPPED.load(Ordering::Relaxed),
        constructions: CONSTRUCTIONS.load(Ordering::Relaxed),
        relinquishes: RELINQUISHES.load(Ordering::Relaxed),
        abandons_executed: ABANDONS_EXECUTED.load(Ordering::Relaxed),
        abandons_skipped: ABANDONS_SKIPPED.load(Ordering::Relaxed),
        storage_write_failures: STORAGE_WRITE_FAILURES.load(Ordering::Relaxed),
    }
}
