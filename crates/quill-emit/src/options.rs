//! Emitter configuration

use crate::metadata::MethodRef;
use serde::{Deserialize, Serialize};

/// How branch instructions pick between short and long forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchEncoding {
    /// Short form whenever the target label's ordinal is at most 127.
    ///
    /// The ordinal says nothing about the distance to the target, so a short
    /// branch can end up out of reach; [`MethodBodySink`](crate::MethodBodySink)
    /// reports that when it resolves the body.
    #[default]
    LabelOrdinal,
    /// Always the four-byte displacement form
    AlwaysLong,
}

/// Knobs for an [`Emitter`](crate::Emitter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterOptions {
    pub branch_encoding: BranchEncoding,
    /// Prefix of auto-derived label names (`Label0`, `Label1`, ...)
    pub label_prefix: String,
    /// Prefix of auto-derived local names
    pub local_prefix: String,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            branch_encoding: BranchEncoding::LabelOrdinal,
            label_prefix: "Label".to_string(),
            local_prefix: "Local".to_string(),
        }
    }
}

impl EmitterOptions {
    /// Parse options from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_branch_encoding(mut self, encoding: BranchEncoding) -> Self {
        self.branch_encoding = encoding;
        self
    }
}

/// Host helper methods the encoder calls for a few fixed operations
///
/// Injected at construction so the emitter never consults a global cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostMethods {
    /// Turns a runtime type handle into a type object; used by `load_type`
    pub type_from_handle: Option<MethodRef>,
}

impl HostMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type_from_handle(mut self, method: MethodRef) -> Self {
        self.type_from_handle = Some(method);
        self
    }
}
