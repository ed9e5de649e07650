use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("record file {} is missing while replaying, rerun in record mode", .filename.display())]
    RetryAndRecord { filename: PathBuf },

    #[error("{url} request error: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} response code: {status}")]
    Response {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("unexpected content type: expected {expected:?}, got {actual:?}")]
    UnexpectedContentType { expected: String, actual: String },

    #[error("login failed, check credentials: {0}")]
    Login(String),

    #[error("service is under maintenance: {0}")]
    Maintenance(String),

    #[error("form element {name} not found")]
    FormElementNotFound { name: String },

    #[error("{0}")]
    Form(String),

    #[error("download was canceled")]
    DownloadCanceled,

    #[error("downloaded file {filename:?} does not match glob {glob:?}")]
    DownloadGlobMismatch { filename: String, glob: String },

    #[error("no download completed within {0:?}")]
    DownloadTimeout(Duration),

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("browser action exceeded {duration:?}: {source}")]
    BrowserTimeout {
        duration: Duration,
        #[source]
        source: Box<Error>,
    },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("length({0}) != 1")]
    MatchCount(usize),

    #[error("#{index}: {source}")]
    Index {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("{field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<Error>,
    },

    #[error("destination field must be public")]
    UnexportedField,

    #[error("expected number, got {text:?}")]
    ParseNumber { text: String },

    #[error("time parse error: {0}")]
    TimeParse(#[from] chrono::ParseError),

    #[error("{0}")]
    Extract(String),

    #[error("invalid selector {0:?}")]
    Selector(String),

    #[error("selector {selector:?} conflicts with the sequence rewrite: {pseudo}")]
    SelectorRewrite {
        selector: String,
        pseudo: &'static str,
    },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("{action} is not supported on the {backend} backend")]
    UnsupportedAction {
        action: &'static str,
        backend: &'static str,
    },

    #[error("no current page, navigate first")]
    NoCurrentPage,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Wraps an extraction error with the field it occurred in. Rewrapping an
    /// already-wrapped error extends the dotted path, so a failure three
    /// levels deep reads `Outer.Inner.Leaf: reason`.
    pub fn field(name: &str, err: Error) -> Error {
        match err {
            Error::Field { field, source } => Error::Field {
                field: format!("{name}.{field}"),
                source,
            },
            other => Error::Field {
                field: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn index(index: usize, err: Error) -> Error {
        Error::Index {
            index,
            source: Box::new(err),
        }
    }
}
