use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Volume driver metrics collector
pub struct DriverMetrics {
    registry: Arc<Registry>,
    /// Total driver operations
    pub operations_total: CounterVec,
    /// Operation duration in seconds
    pub operation_duration: HistogramVec,
    /// Operation errors
    pub operation_errors: CounterVec,
    /// Volumes with at least one attach
    pub attached_volumes: Gauge,
}

impl DriverMetrics {
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let operations_total = CounterVec::new(
            Opts::new("nfs_volume_operations_total", "Total volume driver operations"),
            &["method"],
        )?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "nfs_volume_operation_duration_seconds",
                "Volume driver operation duration in seconds",
            ),
            &["method"],
        )?;

        let operation_errors = CounterVec::new(
            Opts::new("nfs_volume_operation_errors_total", "Volume driver operation errors"),
            &["method"],
        )?;

        let attached_volumes =
            Gauge::new("nfs_volume_attached_volumes", "Volumes with at least one attach")?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(operation_duration.clone()))?;
        registry.register(Box::new(operation_errors.clone()))?;
        registry.register(Box::new(attached_volumes.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_duration,
            operation_errors,
            attached_volumes,
        })
    }

    /// Record an operation
    pub fn record_operation(&self, method: &str, duration_secs: f64, success: bool) {
        self.operations_total.with_label_values(&[method]).inc();
        self.operation_duration.with_label_values(&[method]).observe(duration_secs);

        if !success {
            self.operation_errors.with_label_values(&[method]).inc();
        }
    }

    /// A volume went from idle to attached
    pub fn volume_attached(&self) {
        self.attached_volumes.inc();
    }

    /// A volume's last attacher detached
    pub fn volume_released(&self) {
        self.attached_volumes.dec();
    }

    /// Render all registered metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
