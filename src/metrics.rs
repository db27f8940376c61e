//! Delivery counters, exported in Prometheus text format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

static MAIL_SENT: AtomicU64 = AtomicU64::new(0);
static MAIL_FAILED: AtomicU64 = AtomicU64::new(0);

pub fn record_sent() {
    MAIL_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn record_failed() {
    MAIL_FAILED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub sent: u64,
    pub failed: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sent: MAIL_SENT.load(Ordering::Relaxed),
        failed: MAIL_FAILED.load(Ordering::Relaxed),
    }
}

pub fn render_prometheus() -> String {
    let snap = snapshot();
    let mut out = String::new();

    let counters = [
        ("mail_sent_total", "the total number of successfully sent email", snap.sent),
        ("mail_failed_total", "the total number of email that failed to send", snap.failed),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} counter", name);
        let _ = writeln!(out, "{} {}", name, value);
    }

    out
}
