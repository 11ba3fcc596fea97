use std::fmt;

#[derive(Debug)]
pub enum InspectorError {
    InvalidConfiguration(String),
    InvalidSelector(String),
    InvalidDeclaration(String),
    Parse { source_name: String, message: String },
    NodeNotFound(String),
    UnsupportedEdit(String),
    ReadOnly(String),
    Serialization { source_name: String, message: String },
    Document(String),
    Io(std::io::Error),
}

impl fmt::Display for InspectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectorError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            InspectorError::InvalidSelector(selector) => {
                write!(f, "invalid selector: {}", selector)
            }
            InspectorError::InvalidDeclaration(message) => {
                write!(f, "invalid declaration: {}", message)
            }
            InspectorError::Parse {
                source_name,
                message,
            } => write!(f, "failed to parse {}: {}", source_name, message),
            InspectorError::NodeNotFound(id) => write!(f, "no tree node with id {}", id),
            InspectorError::UnsupportedEdit(message) => {
                write!(f, "unsupported edit: {}", message)
            }
            InspectorError::ReadOnly(label) => write!(f, "{} is read-only", label),
            InspectorError::Serialization {
                source_name,
                message,
            } => write!(f, "failed to serialize {}: {}", source_name, message),
            InspectorError::Document(message) => write!(f, "document error: {}", message),
            InspectorError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for InspectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InspectorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InspectorError {
    fn from(value: std::io::Error) -> Self {
        InspectorError::Io(value)
    }
}
