//! Remote collaborators: the content service and the generation service.
//!
//! Both are traits so the session can run against HTTP clients, an RPC
//! actor, or the in-memory fakes in [`mock`](crate::mock). Request and
//! response types carry the JSON shapes the services speak (`camelCase`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use whiteboard_types::{GraphSnapshot, NodeContent, NodeId, NodeKind, Position, WhiteboardId};

/// Failures talking to a remote service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service rejected request: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("service call timed out")]
    Timeout,
}

/// `status` field of content-service responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

// ============================================================================
// Content service
// ============================================================================

/// `createChildNode` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChildRequest {
    pub kind: NodeKind,
    pub parent_id: NodeId,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_content: Option<NodeContent>,
    /// Persist the node flagged as awaiting generation.
    #[serde(default)]
    pub is_generating: bool,
}

/// `createChildNode` result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChildResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub updated_graph: Option<GraphSnapshot>,
    #[serde(default)]
    pub new_node_id: Option<NodeId>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `validateHierarchy` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyCheck {
    pub node_id: NodeId,
    pub proposed_parent_id: NodeId,
}

/// `validateHierarchy` result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyVerdict {
    pub is_valid: bool,
    #[serde(default)]
    pub cycle_path: Option<Vec<NodeId>>,
}

#[async_trait]
pub trait ContentService: Send + Sync {
    /// Persist a new child node plus its parent-child edge; returns the
    /// server's full graph.
    async fn create_child_node(
        &self,
        whiteboard: &WhiteboardId,
        request: CreateChildRequest,
    ) -> Result<CreateChildResponse, ServiceError>;

    /// Replace the stored graph for a whiteboard.
    async fn update_whiteboard_content(
        &self,
        whiteboard: &WhiteboardId,
        snapshot: &GraphSnapshot,
    ) -> Result<(), ServiceError>;

    /// Server-side hierarchy check for a proposed reparent.
    async fn validate_hierarchy(
        &self,
        whiteboard: &WhiteboardId,
        check: HierarchyCheck,
    ) -> Result<HierarchyVerdict, ServiceError>;
}

// ============================================================================
// Generation service
// ============================================================================

/// `requestGeneration` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub whiteboard_id: WhiteboardId,
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub kind: NodeKind,
    /// Parent content as plain text, captured when the request was made.
    pub parent_content_text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Started,
    Error,
}

/// `requestGeneration` acknowledgement. Results arrive later on the push channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAck {
    pub status: GenerationStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl GenerationAck {
    pub fn started() -> Self {
        Self { status: GenerationStatus::Started, error: None }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self { status: GenerationStatus::Error, error: Some(reason.into()) }
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Start generation. Must return promptly; completion is pushed.
    async fn request_generation(&self, request: GenerationRequest) -> Result<GenerationAck, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_child_wire_shape() {
        let req = CreateChildRequest {
            kind: NodeKind::Topic,
            parent_id: "p".into(),
            position: Position::new(1.0, 2.0),
            initial_content: None,
            is_generating: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["kind"], "topicNode");
        assert_eq!(json["parentId"], "p");
        assert_eq!(json["isGenerating"], true);
        assert!(json.get("initialContent").is_none());
    }

    #[test]
    fn test_create_child_response_tolerates_missing_fields() {
        let resp: CreateChildResponse = serde_json::from_str(r#"{"status":"error","error":"quota"}"#).unwrap();
        assert_eq!(resp.status, ResponseStatus::Error);
        assert_eq!(resp.updated_graph, None);
        assert_eq!(resp.error.as_deref(), Some("quota"));
    }

    #[test]
    fn test_hierarchy_verdict_parses_path() {
        let v: HierarchyVerdict =
            serde_json::from_str(r#"{"isValid":false,"cyclePath":["c","b","a"]}"#).unwrap();
        assert!(!v.is_valid);
        assert_eq!(v.cycle_path.unwrap().len(), 3);
    }

    #[test]
    fn test_generation_request_wire_shape() {
        let req = GenerationRequest {
            whiteboard_id: "wb".into(),
            node_id: "n".into(),
            parent_id: "p".into(),
            kind: NodeKind::Idea,
            parent_content_text: "seed".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["whiteboardId"], "wb");
        assert_eq!(json["parentContentText"], "seed");
        let ack: GenerationAck = serde_json::from_str(r#"{"status":"started"}"#).unwrap();
        assert_eq!(ack, GenerationAck::started());
    }
}
