use thiserror::Error;

/// Domain-layer error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("descriptor for `{entity}` references unknown column `{column}`")]
    UnknownColumn { entity: String, column: String },

    #[error("descriptor for `{entity}` marks JSON column `{column}` as protected")]
    ProtectedJsonColumn { entity: String, column: String },

    #[error("stored JSON in `{entity}.{column}` is corrupt: {source}")]
    CorruptJson {
        entity: String,
        column: String,
        #[source]
        source: serde_json::Error,
    },
}
