/// Message shown when a UI-format workflow export is passed where the API
/// export is expected.
pub const API_WORKFLOW_MESSAGE: &str = "It seems you are trying to parse an ordinary workflow JSON file. \
Please save the workflow with \"Save (API Format)\". If you don't have this button, enable \
\"Dev mode Options\" in the ComfyUI settings (gear icon) first.";

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Wrong workflow format: {0}")]
    Format(String),

    #[error("Unsupported input node class type: {0}")]
    UnsupportedNode(String),

    #[error("Unknown workflow input: {0}")]
    UnknownInput(String),

    #[error("Node {name} is not an input node (class type {class_type})")]
    InvalidNode { name: String, class_type: String },

    #[error("Output node {name} has class type {class_type}, expected one of: {expected}")]
    InvalidOutputType {
        name: String,
        class_type: String,
        expected: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
