use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timed_out_requests: u64,
    pub total_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_endpoint: HashMap<String, EndpointMetrics>,
}

#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_response_time: Duration,
    pub min_response_time: Duration,
    pub max_response_time: Duration,
}

/// Outcome of one listing request as seen by the HTTP layer.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub success: bool,
    pub timed_out: bool,
    pub error_type: Option<String>,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            timed_out_requests: 0,
            total_response_time: Duration::ZERO,
            last_request_time: None,
            requests_by_endpoint: HashMap::new(),
        }
    }
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.total_requests as u32
        }
    }
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            request_count: 0,
            success_count: 0,
            error_count: 0,
            total_response_time: Duration::ZERO,
            min_response_time: Duration::MAX,
            max_response_time: Duration::ZERO,
        }
    }

    fn update(&mut self, metrics: &RequestMetrics) {
        self.request_count += 1;
        self.total_response_time += metrics.response_time;
        self.min_response_time = self.min_response_time.min(metrics.response_time);
        self.max_response_time = self.max_response_time.max(metrics.response_time);

        if metrics.success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.request_count == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.request_count as u32
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.request_count as f64
        }
    }
}

/// Shared by all concurrent page requests of a client.
#[derive(Debug)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(ApiMetrics::default())),
        }
    }

    pub async fn record_request(&self, request_metrics: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.total_response_time += request_metrics.response_time;
        metrics.last_request_time = Some(SystemTime::now());

        if request_metrics.success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        if request_metrics.timed_out {
            metrics.timed_out_requests += 1;
        }

        metrics
            .requests_by_endpoint
            .entry(request_metrics.endpoint.clone())
            .or_insert_with(EndpointMetrics::new)
            .update(&request_metrics);
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hot_request(response_ms: u64, success: bool) -> RequestMetrics {
        RequestMetrics {
            endpoint: "/r/rust/hot".to_string(),
            status_code: Some(if success { 200 } else { 502 }),
            response_time: Duration::from_millis(response_ms),
            success,
            timed_out: false,
            error_type: (!success).then(|| "server_error".to_string()),
        }
    }

    #[tokio::test]
    async fn test_metrics_collection() {
        let collector = MetricsCollector::new();

        collector.record_request(hot_request(150, true)).await;
        collector.record_request(hot_request(250, false)).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.average_response_time(), Duration::from_millis(200));
        assert!(metrics.last_request_time.is_some());
    }

    #[tokio::test]
    async fn test_endpoint_metrics() {
        let collector = MetricsCollector::new();

        collector.record_request(hot_request(100, true)).await;
        collector.record_request(hot_request(300, true)).await;

        let all = collector.get_metrics().await;
        let metrics = &all.requests_by_endpoint["/r/rust/hot"];
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.success_rate(), 1.0);
        assert_eq!(metrics.min_response_time, Duration::from_millis(100));
        assert_eq!(metrics.max_response_time, Duration::from_millis(300));
        assert_eq!(metrics.average_response_time(), Duration::from_millis(200));

        assert!(!all.requests_by_endpoint.contains_key("/hot"));
    }

    #[tokio::test]
    async fn test_timeouts_counted_separately() {
        let collector = MetricsCollector::new();
        collector
            .record_request(RequestMetrics {
                endpoint: "/search".to_string(),
                status_code: None,
                response_time: Duration::from_secs(10),
                success: false,
                timed_out: true,
                error_type: Some("timeout".to_string()),
            })
            .await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.timed_out_requests, 1);
        assert_eq!(metrics.requests_by_endpoint["/search"].success_rate(), 0.0);
    }
}
