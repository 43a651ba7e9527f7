// ── Backend seam ──
//
// The async operations the session needs from the lab backend. `LabClient`
// is the production implementation; tests drive the session with an
// in-memory backend.

use std::future::Future;

use netlab_api::LabClient;
use netlab_api::models::{
    JobEntry, LayoutDocument, NodeStateEntry, SystemMetrics, TopologyGraph, VendorCategory,
};

type ApiResult<T> = Result<T, netlab_api::Error>;

pub trait LabBackend: Send + Sync + 'static {
    fn export_graph(&self, lab_id: &str) -> impl Future<Output = ApiResult<TopologyGraph>> + Send;

    fn import_graph(
        &self,
        lab_id: &str,
        graph: &TopologyGraph,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `None` when the lab has no saved layout.
    fn get_layout(
        &self,
        lab_id: &str,
    ) -> impl Future<Output = ApiResult<Option<LayoutDocument>>> + Send;

    fn put_layout(
        &self,
        lab_id: &str,
        layout: &LayoutDocument,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn node_states(
        &self,
        lab_id: &str,
    ) -> impl Future<Output = ApiResult<Vec<NodeStateEntry>>> + Send;

    fn set_desired_state(
        &self,
        lab_id: &str,
        node_id: &str,
        state: &str,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn sync_node(&self, lab_id: &str, node_id: &str) -> impl Future<Output = ApiResult<()>> + Send;

    fn refresh_nodes(&self, lab_id: &str) -> impl Future<Output = ApiResult<()>> + Send;

    fn list_jobs(&self, lab_id: &str) -> impl Future<Output = ApiResult<Vec<JobEntry>>> + Send;

    fn list_vendors(&self) -> impl Future<Output = ApiResult<Vec<VendorCategory>>> + Send;

    fn lab_up(&self, lab_id: &str) -> impl Future<Output = ApiResult<()>> + Send;

    fn lab_down(&self, lab_id: &str) -> impl Future<Output = ApiResult<()>> + Send;

    fn system_metrics(&self) -> impl Future<Output = ApiResult<SystemMetrics>> + Send;
}

impl LabBackend for LabClient {
    async fn export_graph(&self, lab_id: &str) -> ApiResult<TopologyGraph> {
        LabClient::export_graph(self, lab_id).await
    }

    async fn import_graph(&self, lab_id: &str, graph: &TopologyGraph) -> ApiResult<()> {
        LabClient::import_graph(self, lab_id, graph).await
    }

    async fn get_layout(&self, lab_id: &str) -> ApiResult<Option<LayoutDocument>> {
        LabClient::get_layout(self, lab_id).await
    }

    async fn put_layout(&self, lab_id: &str, layout: &LayoutDocument) -> ApiResult<()> {
        LabClient::put_layout(self, lab_id, layout).await
    }

    async fn node_states(&self, lab_id: &str) -> ApiResult<Vec<NodeStateEntry>> {
        LabClient::node_states(self, lab_id).await
    }

    async fn set_desired_state(&self, lab_id: &str, node_id: &str, state: &str) -> ApiResult<()> {
        LabClient::set_desired_state(self, lab_id, node_id, state).await
    }

    async fn sync_node(&self, lab_id: &str, node_id: &str) -> ApiResult<()> {
        LabClient::sync_node(self, lab_id, node_id).await
    }

    async fn refresh_nodes(&self, lab_id: &str) -> ApiResult<()> {
        LabClient::refresh_nodes(self, lab_id).await
    }

    async fn list_jobs(&self, lab_id: &str) -> ApiResult<Vec<JobEntry>> {
        LabClient::list_jobs(self, lab_id).await
    }

    async fn list_vendors(&self) -> ApiResult<Vec<VendorCategory>> {
        LabClient::list_vendors(self).await
    }

    async fn lab_up(&self, lab_id: &str) -> ApiResult<()> {
        LabClient::lab_up(self, lab_id).await
    }

    async fn lab_down(&self, lab_id: &str) -> ApiResult<()> {
        LabClient::lab_down(self, lab_id).await
    }

    async fn system_metrics(&self) -> ApiResult<SystemMetrics> {
        LabClient::system_metrics(self).await
    }
}
