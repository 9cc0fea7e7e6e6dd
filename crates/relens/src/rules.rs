//! Keyword rules file and the detector/resolver built from it.
//!
//! The rules file maps a tool id to the keywords that indicate a mention and
//! the alternate ids the same tool is known by. Both the detector and the
//! alias resolver are plain lookups over this table; the engine only sees
//! them through its traits.

use anyhow::{Context, Result};
use async_trait::async_trait;
use relens_engine::{AliasResolver, Detector};
use relens_protocol::ToolId;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// One tool entry in the rules file.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolRule {
    pub tool_id: String,
    /// Substrings whose presence counts as a mention (matched case-insensitively)
    pub keywords: Vec<String>,
    /// Alternate ids the same tool appears under
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Deserialized `--rules` file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesFile {
    pub tools: Vec<ToolRule>,
}

impl RulesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse rules file: {}", path.display()))
    }
}

/// Case-insensitive keyword containment over the rules table.
pub struct KeywordDetector {
    // tool id -> lowercased keywords
    rules: Vec<(ToolId, Vec<String>)>,
}

impl KeywordDetector {
    pub fn from_rules(rules: &RulesFile) -> Self {
        Self {
            rules: rules
                .tools
                .iter()
                .map(|rule| {
                    (
                        ToolId::new(rule.tool_id.as_str()),
                        rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Detector for KeywordDetector {
    async fn detect(&self, text: &str) -> Result<BTreeSet<ToolId>> {
        let haystack = text.to_lowercase();
        Ok(self
            .rules
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|(tool_id, _)| tool_id.clone())
            .collect())
    }
}

/// Resolves a tool id to its full alias family.
///
/// Every id in an entry (primary and aliases alike) resolves to the whole
/// family, so a job targeting an alias still covers the primary id. Unknown
/// ids resolve to an empty family.
pub struct RulesAliasResolver {
    families: HashMap<String, BTreeSet<ToolId>>,
}

impl RulesAliasResolver {
    pub fn from_rules(rules: &RulesFile) -> Self {
        let mut families = HashMap::new();
        for rule in &rules.tools {
            let mut family: BTreeSet<ToolId> = BTreeSet::new();
            family.insert(ToolId::new(rule.tool_id.as_str()));
            family.extend(rule.aliases.iter().map(ToolId::new));
            for member in &family {
                families.insert(member.as_ref().to_string(), family.clone());
            }
        }
        Self { families }
    }
}

#[async_trait]
impl AliasResolver for RulesAliasResolver {
    async fn resolve(&self, tool_id: &ToolId) -> Result<BTreeSet<ToolId>> {
        Ok(self
            .families
            .get(tool_id.as_ref())
            .cloned()
            .unwrap_or_default())
    }
}
