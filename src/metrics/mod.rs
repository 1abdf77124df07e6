use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mirror_notifications_total", "Watch notifications handled by the dispatcher"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref IGNORED_NOTIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "mirror_ignored_notifications_total",
            "Notifications for paths whose watch is no longer installed"
        ),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCHES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("mirror_active_watches", "Currently installed watches"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref WRITE_BACK_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mirror_write_back_total", "Write-back operations by outcome"),
        &["op", "outcome"]
    )
    .expect("metric can not be created");
}

/// Registers the mirror collectors into `registry`.
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(NOTIFICATIONS_TOTAL.clone()))?;
    registry.register(Box::new(IGNORED_NOTIFICATIONS_TOTAL.clone()))?;
    registry.register(Box::new(ACTIVE_WATCHES.clone()))?;
    registry.register(Box::new(WRITE_BACK_TOTAL.clone()))?;
    Ok(())
}

pub(crate) fn record_write_back<T>(
    op: &str,
    result: &crate::Result<T>,
) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    WRITE_BACK_TOTAL.with_label_values(&[op, outcome]).inc();
}
