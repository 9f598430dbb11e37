use data_model_smap::ConnectionPoolError;

#[derive(Debug)]
pub enum Error {
    /// Another process holds the generation lock.
    Busy,
    DbPoolError(String),
    /// The site manifest is missing or unreadable.
    SiteError(String),
    CoreError(core_smap::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "Another sitemap generation is in progress."),
            Self::DbPoolError(pool_error_desc) => write!(f, "Database pool error: {}", pool_error_desc),
            Self::SiteError(desc) => write!(f, "Site error: {}", desc),
            Self::CoreError(core_error) => write!(f, "{}", core_error),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConnectionPoolError> for Error {
    fn from(error: ConnectionPoolError) -> Self {
        Self::DbPoolError(error.to_string())
    }
}

impl From<core_smap::Error> for Error {
    fn from(error: core_smap::Error) -> Self {
        Self::CoreError(error)
    }
}
