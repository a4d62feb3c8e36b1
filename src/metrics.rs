//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Realtime Metrics
    pub static ref REALTIME_SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "clanhall_realtime_sessions_active",
        "Current number of registered live sessions"
    ).expect("metric can be created");
    pub static ref USERS_ONLINE: IntGauge = IntGauge::new(
        "clanhall_users_online",
        "Current number of users with at least one live session"
    ).expect("metric can be created");
    pub static ref REALTIME_EVENTS_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "clanhall_realtime_events_delivered_total",
            "Total number of events handed to live sessions",
        ),
        &["event"]
    ).expect("metric can be created");
    pub static ref REALTIME_DELIVERY_FAILURES: IntCounter = IntCounter::new(
        "clanhall_realtime_delivery_failures_total",
        "Total number of deliveries dropped because the session was gone"
    ).expect("metric can be created");

    // Domain Metrics
    pub static ref NOTIFICATIONS_CREATED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "clanhall_notifications_created_total",
            "Total number of notification records created",
        ),
        &["kind"]
    ).expect("metric can be created");
    pub static ref FEED_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("clanhall_feed_requests_total", "Total number of feed reads"),
        &["feed"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanhall_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanhall_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("clanhall_cache_size", "Current number of items in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clanhall_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; later registrations are ignored so that
/// integration tests can boot several servers in one process.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REALTIME_SESSIONS_ACTIVE.clone()),
        Box::new(USERS_ONLINE.clone()),
        Box::new(REALTIME_EVENTS_DELIVERED.clone()),
        Box::new(REALTIME_DELIVERY_FAILURES.clone()),
        Box::new(NOTIFICATIONS_CREATED.clone()),
        Box::new(FEED_REQUESTS.clone()),
        Box::new(CACHE_HITS_TOTAL.clone()),
        Box::new(CACHE_MISSES_TOTAL.clone()),
        Box::new(CACHE_SIZE.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(%error, "Metric already registered");
        }
    }

    tracing::info!("Metrics registry initialized");
}
