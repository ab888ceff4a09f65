use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("invalid_input - {0}")]
    InvalidInput(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("io_error - {0}")]
    Io(String),
    #[error("fetch_error - {0}")]
    Fetch(String),
    #[error("cron_parse - '{expression}': {message}")]
    CronParse { expression: String, message: String },
    #[error("no_occurrence - no occurrence found for '{expression}'")]
    NoOccurrence { expression: String },
    #[error("notification_error - {0}")]
    Notification(String),
}

impl AppError {
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn fetch<M: Into<String>>(message: M) -> Self {
        Self::Fetch(message.into())
    }

    pub fn cron_parse<E: Into<String>, M: Into<String>>(expression: E, message: M) -> Self {
        Self::CronParse {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn no_occurrence<E: Into<String>>(expression: E) -> Self {
        Self::NoOccurrence {
            expression: expression.into(),
        }
    }

    pub fn notification<M: Into<String>>(message: M) -> Self {
        Self::Notification(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidData(_) => "invalid_data",
            Self::Io(_) => "io_error",
            Self::Fetch(_) => "fetch_error",
            Self::CronParse { .. } => "cron_parse",
            Self::NoOccurrence { .. } => "no_occurrence",
            Self::Notification(_) => "notification_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput(message)
            | Self::InvalidData(message)
            | Self::Io(message)
            | Self::Fetch(message)
            | Self::Notification(message) => message.clone(),
            Self::CronParse {
                expression,
                message,
            } => format!("'{expression}': {message}"),
            Self::NoOccurrence { expression } => {
                format!("no occurrence found for '{expression}'")
            }
        }
    }

    /// Errors that only disqualify a single task record.
    pub fn is_per_record(&self) -> bool {
        matches!(self, Self::CronParse { .. } | Self::NoOccurrence { .. })
    }
}
