use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum X3dError {
    #[error("attribute `{attribute}`: {token:?} is not a number")]
    Parse { attribute: String, token: String },

    #[error("malformed index list in <{node}>: {reason}")]
    MalformedIndex { node: String, reason: String },

    #[error("USE=\"{0}\" does not match any DEF")]
    UnresolvedReference(String),

    #[error("unsupported material: {0}")]
    UnsupportedMaterial(String),

    #[error("missing resource: {}", .0.display())]
    MissingResource(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid XML document: {0}")]
    Xml(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl X3dError {
    pub fn parse(token: impl Into<String>) -> Self {
        Self::Parse {
            attribute: String::new(),
            token: token.into(),
        }
    }

    pub fn malformed_index(node: &str, reason: impl Into<String>) -> Self {
        Self::MalformedIndex {
            node: node.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attaches the attribute name to a parse error. Other variants pass through.
    pub fn in_attribute(self, name: &str) -> Self {
        match self {
            Self::Parse { token, .. } => Self::Parse {
                attribute: name.to_string(),
                token,
            },
            other => other,
        }
    }

    /// Fatal errors abort the whole export/import; everything else is
    /// recovered locally and reported as a diagnostic.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Xml(_) | Self::Image(_))
    }
}

/// Recovered, per-node problems collected during one traversal.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<X3dError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: X3dError) {
        log::warn!("{}", error);
        self.entries.push(error);
    }

    /// Unwraps one attribute read. A value that does not parse is reported
    /// and replaced by `default`.
    pub fn recover<T>(&mut self, result: Result<T, X3dError>, attribute: &str, default: T) -> T {
        result.unwrap_or_else(|error| {
            self.push(error.in_attribute(attribute));
            default
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &X3dError> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<X3dError> {
        self.entries
    }
}
