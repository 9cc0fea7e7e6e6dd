//! External capability seams: the detector and the alias resolver.
//!
//! The classification algorithm itself lives outside this crate; the engine
//! only needs "text in, tool ids out" and "tool id in, alias family out".

use async_trait::async_trait;
use relens_protocol::ToolId;
use std::collections::BTreeSet;

/// Maps a record's text payload to the set of tools it mentions.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, text: &str) -> anyhow::Result<BTreeSet<ToolId>>;
}

/// Expands one tool id to its full equivalence set (primary + aliases/merges),
/// so merged tools are treated as one target family when filtering.
#[async_trait]
pub trait AliasResolver: Send + Sync {
    async fn resolve(&self, tool_id: &ToolId) -> anyhow::Result<BTreeSet<ToolId>>;
}
