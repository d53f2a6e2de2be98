use crate::catalog::TableDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What part of a table a blob covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlobKind {
    Whole,
    /// Rows matching `condition`, a standalone boolean SQL predicate.
    Range { condition: String },
}

/// One schedulable export unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub schema: String,
    pub table: String,
    pub qualified: String,
    pub size_kb: u64,
    /// Position of this slice within its table, 0 for whole-table blobs.
    pub part: u32,
    pub kind: BlobKind,
}

impl Blob {
    pub fn whole(t: &TableDescriptor) -> Self {
        Self {
            schema: t.schema.clone(),
            table: t.table.clone(),
            qualified: t.qualified.clone(),
            size_kb: t.size_kb,
            part: 0,
            kind: BlobKind::Whole,
        }
    }

    pub fn range(t: &TableDescriptor, part: u32, size_kb: u64, condition: String) -> Self {
        Self {
            schema: t.schema.clone(),
            table: t.table.clone(),
            qualified: t.qualified.clone(),
            size_kb,
            part,
            kind: BlobKind::Range { condition },
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self.kind {
            BlobKind::Whole => "whole",
            BlobKind::Range { .. } => "range",
        }
    }

    pub fn condition(&self) -> Option<&str> {
        match &self.kind {
            BlobKind::Whole => None,
            BlobKind::Range { condition } => Some(condition),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self.kind, BlobKind::Range { .. })
    }
}

/// A blob with its position in the work order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledBlob {
    pub id: u32,
    pub blob: Blob,
}

impl fmt::Display for ScheduledBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dump (#{}) of {}.{}", self.blob.type_tag(), self.id, self.blob.schema, self.blob.table)
    }
}
