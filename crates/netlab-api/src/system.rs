use crate::client::LabClient;
use crate::error::Error;
use crate::models::SystemMetrics;

impl LabClient {
    /// Backend host metrics.
    ///
    /// `GET /dashboard/metrics`
    pub async fn system_metrics(&self) -> Result<SystemMetrics, Error> {
        let url = self.endpoint(&["dashboard", "metrics"])?;
        self.get(url).await
    }
}
