// Lab-level endpoints
//
// Topology graph import/export, canvas layout, and the global deploy and
// destroy actions.

use tracing::debug;

use crate::client::LabClient;
use crate::error::Error;
use crate::models::{LayoutDocument, TopologyGraph};

impl LabClient {
    /// Export the node/link graph of a lab.
    ///
    /// `GET /labs/{id}/export-graph`
    pub async fn export_graph(&self, lab_id: &str) -> Result<TopologyGraph, Error> {
        let url = self.endpoint(&["labs", lab_id, "export-graph"])?;
        self.get(url).await
    }

    /// Replace the lab's node/link graph.
    ///
    /// `POST /labs/{id}/import-graph`
    pub async fn import_graph(&self, lab_id: &str, graph: &TopologyGraph) -> Result<(), Error> {
        let url = self.endpoint(&["labs", lab_id, "import-graph"])?;
        debug!(
            lab_id,
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "importing graph"
        );
        self.post_no_content(url, graph).await
    }

    /// Fetch the saved layout. A lab that never saved one returns `None`.
    ///
    /// `GET /labs/{id}/layout`
    pub async fn get_layout(&self, lab_id: &str) -> Result<Option<LayoutDocument>, Error> {
        let url = self.endpoint(&["labs", lab_id, "layout"])?;
        match self.get(url).await {
            Ok(layout) => Ok(Some(layout)),
            Err(e) if e.is_not_found() => {
                debug!(lab_id, "no saved layout");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Save the layout.
    ///
    /// `PUT /labs/{id}/layout`
    pub async fn put_layout(&self, lab_id: &str, layout: &LayoutDocument) -> Result<(), Error> {
        let url = self.endpoint(&["labs", lab_id, "layout"])?;
        self.put_no_content(url, layout).await
    }

    /// Queue a global deploy job.
    ///
    /// `POST /labs/{id}/up`
    pub async fn lab_up(&self, lab_id: &str) -> Result<(), Error> {
        let url = self.endpoint(&["labs", lab_id, "up"])?;
        self.post_empty(url).await
    }

    /// Queue a global destroy job.
    ///
    /// `POST /labs/{id}/down`
    pub async fn lab_down(&self, lab_id: &str) -> Result<(), Error> {
        let url = self.endpoint(&["labs", lab_id, "down"])?;
        self.post_empty(url).await
    }
}
