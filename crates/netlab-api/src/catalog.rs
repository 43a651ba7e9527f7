// Device catalog endpoint

use tracing::debug;

use crate::client::LabClient;
use crate::error::Error;
use crate::models::VendorCategory;

impl LabClient {
    /// Fetch the device catalog.
    ///
    /// `GET /vendors`
    pub async fn list_vendors(&self) -> Result<Vec<VendorCategory>, Error> {
        let url = self.endpoint(&["vendors"])?;
        debug!("fetching device catalog");
        self.get(url).await
    }
}
