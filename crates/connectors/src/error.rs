use model::error::ErrorKind;
use thiserror::Error;

/// Connector-level error, classified into §7's error taxonomy via
/// [`ConnectorError::kind`] so callers never have to pattern-match on a
/// driver's own error type.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("could not connect to source: {0}")]
    Connect(String),

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("schema drift detected: {0}")]
    SchemaDrift(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Connect(_) => ErrorKind::SourceUnavailable,
            ConnectorError::QueryRejected(_) => ErrorKind::QueryRejected,
            ConnectorError::Transient(_) => ErrorKind::Transient,
            ConnectorError::SchemaDrift(_) => ErrorKind::SchemaDrift,
            ConnectorError::Io(_) => ErrorKind::Transient,
        }
    }
}

impl From<mysql_async::Error> for ConnectorError {
    fn from(err: mysql_async::Error) -> Self {
        use mysql_async::Error as E;
        match &err {
            E::Io(_) | E::Driver(_) => ConnectorError::Transient(err.to_string()),
            E::Server(server_err) if is_mysql_transient(server_err.code) => {
                ConnectorError::Transient(err.to_string())
            }
            E::Server(_) => ConnectorError::QueryRejected(err.to_string()),
            _ => ConnectorError::Connect(err.to_string()),
        }
    }
}

fn is_mysql_transient(code: u16) -> bool {
    // 1205 lock wait timeout, 1213 deadlock, 2006/2013 server gone away / lost connection
    matches!(code, 1205 | 1213 | 2006 | 2013)
}

impl From<tokio_postgres::Error> for ConnectorError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return ConnectorError::Transient(err.to_string());
        }
        match err.code() {
            Some(code) if code.code().starts_with("08") => {
                ConnectorError::Transient(err.to_string())
            }
            Some(_) => ConnectorError::QueryRejected(err.to_string()),
            None => ConnectorError::Connect(err.to_string()),
        }
    }
}
