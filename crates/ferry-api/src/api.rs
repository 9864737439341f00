//! The seam between the sync engine and a tool's REST API.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    AbortSignal, ApiError, EntityGroup, FetchError, RouteTable, Tool, ToolClient, ToolConfig,
};

/// Raw collection reads and entity writes against one tool.
///
/// Payloads cross this boundary as untyped JSON; turning them into canonical
/// records is the caller's business.
#[async_trait]
pub trait ToolApi: Send + Sync {
    fn tool(&self) -> Tool;

    /// Concurrency window for batch writes against this tool.
    fn max_in_flight(&self) -> usize;

    /// Whether project payloads already carry their members.
    fn project_members_embedded(&self) -> bool;

    /// Every item of a group. `workspace_id` is ignored for workspaces.
    async fn fetch_collection(
        &self,
        group: EntityGroup,
        workspace_id: &str,
    ) -> Result<Vec<Value>, FetchError>;

    /// Member records of one project.
    async fn fetch_project_members(
        &self,
        workspace_id: &str,
        project_id: &str,
    ) -> Result<Vec<Value>, FetchError>;

    /// Create one entity and return the tool's representation of it.
    ///
    /// Gives up with [`ApiError::Aborted`] if `signal` is raised before the
    /// request is sent.
    async fn create(
        &self,
        group: EntityGroup,
        workspace_id: &str,
        body: &Value,
        signal: &AbortSignal,
    ) -> Result<Value, ApiError>;

    async fn delete(
        &self,
        group: EntityGroup,
        workspace_id: &str,
        id: &str,
        signal: &AbortSignal,
    ) -> Result<(), ApiError>;
}

/// [`ToolApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpToolApi {
    client: ToolClient,
    routes: RouteTable,
}

impl HttpToolApi {
    pub fn new(config: ToolConfig) -> Self {
        let routes = RouteTable::new(config.tool, config.page_size);
        Self {
            client: ToolClient::new(config),
            routes,
        }
    }

    pub fn client(&self) -> &ToolClient {
        &self.client
    }
}

#[async_trait]
impl ToolApi for HttpToolApi {
    fn tool(&self) -> Tool {
        self.client.tool()
    }

    fn max_in_flight(&self) -> usize {
        self.client.throttle().max_in_flight()
    }

    fn project_members_embedded(&self) -> bool {
        self.routes.project_members("", "").is_none()
    }

    async fn fetch_collection(
        &self,
        group: EntityGroup,
        workspace_id: &str,
    ) -> Result<Vec<Value>, FetchError> {
        let endpoint = self.routes.collection(group, workspace_id);
        let items = self.client.fetch_all(&endpoint).await?;
        debug!(tool = %self.tool(), %group, workspace_id, count = items.len(), "fetched collection");
        Ok(items)
    }

    async fn fetch_project_members(
        &self,
        workspace_id: &str,
        project_id: &str,
    ) -> Result<Vec<Value>, FetchError> {
        match self.routes.project_members(workspace_id, project_id) {
            Some(endpoint) => self.client.fetch_all(&endpoint).await,
            None => Ok(Vec::new()),
        }
    }

    async fn create(
        &self,
        group: EntityGroup,
        workspace_id: &str,
        body: &Value,
        signal: &AbortSignal,
    ) -> Result<Value, ApiError> {
        let endpoint = self.routes.create(group, workspace_id);
        self.client.post_json(&endpoint, body, signal).await
    }

    async fn delete(
        &self,
        group: EntityGroup,
        workspace_id: &str,
        id: &str,
        signal: &AbortSignal,
    ) -> Result<(), ApiError> {
        let endpoint = self.routes.delete(group, workspace_id, id);
        self.client.delete(&endpoint, signal).await
    }
}
