use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("data integrity error: missing or invalid `{field}` ({context})")]
    DataIntegrity { field: String, context: String },

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        SimError::Config(msg.into())
    }

    pub fn missing(field: impl Into<String>, context: impl Into<String>) -> Self {
        SimError::DataIntegrity {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn lookup(msg: impl Into<String>) -> Self {
        SimError::Lookup(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        SimError::Numerical(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::SimError;

    #[test]
    fn data_integrity_message_names_the_field() {
        let err = SimError::missing("winner", "match 7 (season 0, round 2)");
        let text = err.to_string();
        assert!(text.contains("`winner`"));
        assert!(text.contains("match 7"));
    }
}
