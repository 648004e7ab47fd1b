use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum StoreError {
    InvalidConfig(String),
    MalformedSection { expected: usize, actual: usize },
    PaletteIndexOutOfRange { index: u64, len: usize },
    UnknownHeightMap(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Any(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidConfig(v) => write!(f, "Invalid config: {}", v),
            StoreError::MalformedSection { expected, actual } => {
                write!(f, "Malformed section: expected {} words, got {}", expected, actual)
            }
            StoreError::PaletteIndexOutOfRange { index, len } => {
                write!(f, "Palette index {} out of range for palette of {}", index, len)
            }
            StoreError::UnknownHeightMap(v) => write!(f, "Unknown height map type: {}", v),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Json(e) => write!(f, "JSON error: {}", e),
            StoreError::Any(v) => write!(f, "{}", v),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::Any(s)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}
