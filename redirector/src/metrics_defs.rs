use shared::metrics_defs::{MetricDef, MetricType};

pub const CLICK_OUTCOMES: MetricDef = MetricDef {
    name: "clicks.outcome",
    metric_type: MetricType::Counter,
    description: "Terminal click outcomes. Tagged with outcome.",
};

pub const TRACKER_CALL_DURATION: MetricDef = MetricDef {
    name: "tracker.call.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of the marketing_process call in seconds",
};

pub const NOTIFY_FAILURES: MetricDef = MetricDef {
    name: "notify.failures",
    metric_type: MetricType::Counter,
    description: "Notifications that could not be delivered",
};

pub const ALL_METRICS: &[MetricDef] = &[CLICK_OUTCOMES, TRACKER_CALL_DURATION, NOTIFY_FAILURES];
