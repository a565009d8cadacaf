//! Export of the exact operation documents sent to the server, for
//! safelisting.

use crate::convert::OperationDef;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedOperations {
    pub operations: Vec<ExportedOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedOperation {
    pub operation_name: String,
    /// The document, byte for byte as the generated code sends it.
    pub query: String,
    /// `file:line` of the operation.
    pub source_location: String,
}

/// Collects the documents of `operations`, in source order.
pub fn export_operations(operations: &[OperationDef]) -> ExportedOperations {
    ExportedOperations {
        operations: operations
            .iter()
            .map(|operation| ExportedOperation {
                operation_name: operation.name.clone(),
                query: operation.text.clone(),
                source_location: operation
                    .position
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
            .collect(),
    }
}

impl ExportedOperations {
    /// Renders the export as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
