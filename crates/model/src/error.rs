use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Manifest is missing required field '{0}'")]
    MissingField(String),

    #[error("Archive was not produced by {expected} (generator is '{found}')")]
    GeneratorMismatch { expected: String, found: String },

    #[error("Unsupported manifest format version {found} (newest supported is {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },

    #[error("Target site {what} {found} is older than the required {required}")]
    Incompatible {
        what: String,
        required: String,
        found: String,
    },
}
