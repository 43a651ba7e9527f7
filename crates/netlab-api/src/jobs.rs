use crate::client::LabClient;
use crate::error::Error;
use crate::models::JobEntry;

impl LabClient {
    /// List jobs for a lab, newest first as the backend orders them.
    ///
    /// `GET /labs/{id}/jobs`
    pub async fn list_jobs(&self, lab_id: &str) -> Result<Vec<JobEntry>, Error> {
        let url = self.endpoint(&["labs", lab_id, "jobs"])?;
        self.get(url).await
    }
}
