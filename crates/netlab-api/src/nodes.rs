// Node runtime endpoints
//
// Desired-state writes, out-of-band sync, and the state listing the
// reconciler polls.

use tracing::debug;

use crate::client::LabClient;
use crate::error::Error;
use crate::models::{DesiredStateRequest, NodeStateEntry};

impl LabClient {
    /// List runtime state rows for every node of a lab.
    ///
    /// `GET /labs/{id}/nodes/states`
    pub async fn node_states(&self, lab_id: &str) -> Result<Vec<NodeStateEntry>, Error> {
        let url = self.endpoint(&["labs", lab_id, "nodes", "states"])?;
        self.get(url).await
    }

    /// Record the user's intended power state for a node.
    ///
    /// `PUT /labs/{id}/nodes/{nodeId}/desired-state`
    pub async fn set_desired_state(
        &self,
        lab_id: &str,
        node_id: &str,
        state: &str,
    ) -> Result<(), Error> {
        let url = self.endpoint(&["labs", lab_id, "nodes", node_id, "desired-state"])?;
        debug!(lab_id, node_id, state, "setting desired state");
        self.put_no_content(
            url,
            &DesiredStateRequest {
                state: state.to_owned(),
            },
        )
        .await
    }

    /// Ask the backend to reconcile desired vs. actual for one node.
    ///
    /// `POST /labs/{id}/nodes/{nodeId}/sync`
    pub async fn sync_node(&self, lab_id: &str, node_id: &str) -> Result<(), Error> {
        let url = self.endpoint(&["labs", lab_id, "nodes", node_id, "sync"])?;
        debug!(lab_id, node_id, "triggering node sync");
        self.post_empty(url).await
    }

    /// Ask the backend to re-read actual state from its agents.
    ///
    /// `POST /labs/{id}/nodes/refresh`
    pub async fn refresh_nodes(&self, lab_id: &str) -> Result<(), Error> {
        let url = self.endpoint(&["labs", lab_id, "nodes", "refresh"])?;
        self.post_empty(url).await
    }
}
