//! Endpoint descriptors for each tool's REST API.
//!
//! The source tool uses snake_case resources under `/workspaces`, wraps
//! single-record responses in a `data` envelope and pages time entries by
//! cursor. The target tool uses kebab-case resources under `/v1/workspaces`
//! and pages every collection by page number.

use crate::{EntityGroup, Tool};

/// How a collection endpoint splits its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// The whole collection comes back in one response.
    Unpaged,
    /// 1-based page numbers.
    PageNumber {
        page_param: &'static str,
        size_param: &'static str,
        page_size: u32,
    },
    /// Opaque cursor returned in a response header.
    Cursor {
        cursor_param: &'static str,
        size_param: &'static str,
        page_size: u32,
        next_header: &'static str,
    },
}

/// A concrete request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub path: String,
    pub pagination: Pagination,
    /// Key wrapping the payload in responses, if any.
    pub envelope: Option<&'static str>,
}

impl Endpoint {
    fn unpaged(path: String) -> Self {
        Self {
            path,
            pagination: Pagination::Unpaged,
            envelope: None,
        }
    }
}

/// Builds endpoints for one tool.
#[derive(Debug, Clone)]
pub struct RouteTable {
    tool: Tool,
    page_size: u32,
}

impl RouteTable {
    pub fn new(tool: Tool, page_size: u32) -> Self {
        Self {
            tool,
            page_size: page_size.max(1),
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    fn segment(&self, group: EntityGroup) -> &'static str {
        match (self.tool, group) {
            (_, EntityGroup::Workspaces) => "",
            (_, EntityGroup::Clients) => "clients",
            (_, EntityGroup::Projects) => "projects",
            (_, EntityGroup::Tags) => "tags",
            (_, EntityGroup::Tasks) => "tasks",
            (Tool::Source, EntityGroup::UserGroups) => "groups",
            (Tool::Target, EntityGroup::UserGroups) => "user-groups",
            (_, EntityGroup::Users) => "users",
            (Tool::Source, EntityGroup::TimeEntries) => "time_entries",
            (Tool::Target, EntityGroup::TimeEntries) => "time-entries",
        }
    }

    fn workspaces_root(&self) -> &'static str {
        match self.tool {
            Tool::Source => "/workspaces",
            Tool::Target => "/v1/workspaces",
        }
    }

    fn group_path(&self, group: EntityGroup, workspace_id: &str) -> String {
        match group {
            EntityGroup::Workspaces => self.workspaces_root().to_string(),
            _ => format!(
                "{}/{}/{}",
                self.workspaces_root(),
                workspace_id,
                self.segment(group)
            ),
        }
    }

    /// Collection endpoint for a group. `workspace_id` is ignored for
    /// workspaces themselves.
    pub fn collection(&self, group: EntityGroup, workspace_id: &str) -> Endpoint {
        let path = self.group_path(group, workspace_id);
        let pagination = match (self.tool, group) {
            (Tool::Source, EntityGroup::TimeEntries) => Pagination::Cursor {
                cursor_param: "cursor",
                size_param: "per_page",
                page_size: self.page_size,
                next_header: "X-Next-Cursor",
            },
            (Tool::Source, _) | (Tool::Target, EntityGroup::Workspaces) => Pagination::Unpaged,
            (Tool::Target, _) => Pagination::PageNumber {
                page_param: "page",
                size_param: "page-size",
                page_size: self.page_size,
            },
        };

        Endpoint {
            path,
            pagination,
            envelope: None,
        }
    }

    /// Members of one project, for tools whose project payload omits them.
    pub fn project_members(&self, workspace_id: &str, project_id: &str) -> Option<Endpoint> {
        match self.tool {
            Tool::Source => Some(Endpoint::unpaged(format!(
                "/workspaces/{}/projects/{}/project_users",
                workspace_id, project_id
            ))),
            Tool::Target => None,
        }
    }

    /// Create endpoint for a group.
    pub fn create(&self, group: EntityGroup, workspace_id: &str) -> Endpoint {
        let mut endpoint = Endpoint::unpaged(self.group_path(group, workspace_id));
        if self.tool == Tool::Source {
            endpoint.envelope = Some("data");
        }
        endpoint
    }

    /// Delete endpoint for one entity.
    pub fn delete(&self, group: EntityGroup, workspace_id: &str, id: &str) -> Endpoint {
        let path = match group {
            EntityGroup::Workspaces => format!("{}/{}", self.workspaces_root(), id),
            _ => format!("{}/{}", self.group_path(group, workspace_id), id),
        };
        Endpoint::unpaged(path)
    }
}
