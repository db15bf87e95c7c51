use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub quotes_total: IntCounterVec,
    pub quote_latency_seconds: HistogramVec,
    pub orders_created_total: IntCounter,
    pub accept_attempts_total: IntCounterVec,
    pub orders_expired_total: IntCounter,
    pub coupon_usage_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let quotes_total = IntCounterVec::new(
            Opts::new("quotes_total", "Fare quotes by outcome"),
            &["outcome"],
        )
        .expect("valid quotes_total metric");

        let quote_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "quote_latency_seconds",
                "Latency of service-area check, routing and pricing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid quote_latency_seconds metric");

        let orders_created_total =
            IntCounter::new("orders_created_total", "Orders successfully created")
                .expect("valid orders_created_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Driver acceptance attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let orders_expired_total = IntCounter::new(
            "orders_expired_total",
            "Unassigned orders cancelled by the expiry sweep",
        )
        .expect("valid orders_expired_total metric");

        let coupon_usage_failures_total = IntCounter::new(
            "coupon_usage_failures_total",
            "Coupon usage increments abandoned after retries",
        )
        .expect("valid coupon_usage_failures_total metric");

        registry
            .register(Box::new(quotes_total.clone()))
            .expect("register quotes_total");
        registry
            .register(Box::new(quote_latency_seconds.clone()))
            .expect("register quote_latency_seconds");
        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(orders_expired_total.clone()))
            .expect("register orders_expired_total");
        registry
            .register(Box::new(coupon_usage_failures_total.clone()))
            .expect("register coupon_usage_failures_total");

        Self {
            registry,
            quotes_total,
            quote_latency_seconds,
            orders_created_total,
            accept_attempts_total,
            orders_expired_total,
            coupon_usage_failures_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
