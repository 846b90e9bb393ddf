use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FetchedMetadata, FetchedRelease, RepositoryMetadata};

pub(crate) const METADATA_QUERY: &str = r"
query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    name
    description
    homepageUrl
    forkCount
    stargazerCount
    isArchived
    isInOrganization
    defaultBranchRef { name }
    owner {
      login
      avatarUrl
      ... on User { name }
      ... on Organization { name }
    }
    openIssues: issues(states: [OPEN]) { totalCount }
    openPullRequests: pullRequests(states: [OPEN]) { totalCount }
    closedIssues: issues(states: [CLOSED], first: 1, orderBy: {field: UPDATED_AT, direction: DESC}) {
      nodes { closedAt }
    }
    closedPullRequests: pullRequests(states: [CLOSED, MERGED], first: 1, orderBy: {field: UPDATED_AT, direction: DESC}) {
      nodes { closedAt }
    }
    releases(first: 20, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes { tagName name description isDraft publishedAt url }
    }
    repositoryTopics(first: 20) {
      nodes { topic { name } }
    }
  }
}
";

#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: RepositoryVariables<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RepositoryVariables<'a> {
    pub owner: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse {
    pub data: Option<RepositoryData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryData {
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryNode {
    name: String,
    description: Option<String>,
    homepage_url: Option<String>,
    fork_count: u32,
    stargazer_count: u32,
    is_archived: bool,
    is_in_organization: bool,
    default_branch_ref: Option<BranchRef>,
    owner: Owner,
    open_issues: TotalCount,
    open_pull_requests: TotalCount,
    closed_issues: Nodes<ClosedNode>,
    closed_pull_requests: Nodes<ClosedNode>,
    releases: Nodes<ReleaseNode>,
    repository_topics: Nodes<TopicNode>,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Owner {
    login: String,
    avatar_url: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: u32,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosedNode {
    closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    tag_name: String,
    name: Option<String>,
    description: Option<String>,
    is_draft: bool,
    published_at: Option<DateTime<Utc>>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TopicNode {
    topic: Topic,
}

#[derive(Debug, Deserialize)]
struct Topic {
    name: String,
}

impl GraphQlResponse {
    /// Folds the payload into fetched metadata.
    ///
    /// A `NOT_FOUND` error next to a null repository means the repository is gone and
    /// yields metadata without a repository; any other error fails the request.
    pub(crate) fn into_metadata(self) -> Result<FetchedMetadata, String> {
        let repository = self.data.and_then(|data| data.repository);

        if repository.is_none() && !self.errors.is_empty() {
            let all_not_found = self
                .errors
                .iter()
                .all(|error| error.kind.as_deref() == Some("NOT_FOUND"));
            if !all_not_found {
                let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
                return Err(messages.join("; "));
            }
        }

        Ok(FetchedMetadata {
            repository: repository.map(RepositoryMetadata::from),
        })
    }
}

impl From<RepositoryNode> for RepositoryMetadata {
    fn from(node: RepositoryNode) -> Self {
        let last_closed = |nodes: &Nodes<ClosedNode>| nodes.nodes.first().and_then(|n| n.closed_at);

        RepositoryMetadata {
            last_issue_closed_at: last_closed(&node.closed_issues),
            last_pull_request_closed_at: last_closed(&node.closed_pull_requests),
            name: node.name,
            owner: node.owner.login,
            owner_name: node.owner.name,
            owner_avatar_url: node.owner.avatar_url,
            summary: node.description,
            homepage_url: node.homepage_url,
            default_branch: node.default_branch_ref.map(|branch| branch.name),
            forks: node.fork_count,
            stars: node.stargazer_count,
            is_archived: node.is_archived,
            is_in_organization: node.is_in_organization,
            open_issues: node.open_issues.total_count,
            open_pull_requests: node.open_pull_requests.total_count,
            topics: node
                .repository_topics
                .nodes
                .into_iter()
                .map(|node| node.topic.name)
                .collect(),
            releases: node
                .releases
                .nodes
                .into_iter()
                .map(|release| FetchedRelease {
                    tag_name: release.tag_name,
                    name: release.name,
                    description: release.description,
                    is_draft: release.is_draft,
                    published_at: release.published_at,
                    url: release.url,
                })
                .collect(),
        }
    }
}
