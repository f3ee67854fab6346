use thiserror::Error;

use crate::directory::DirectoryError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("integration failure: {0}")]
    Integration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Integration(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}

impl From<DirectoryError> for ApplicationError {
    fn from(value: DirectoryError) -> Self {
        Self::Integration(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::directory::DirectoryError;
    use crate::errors::{ApplicationError, InterfaceError};
    use crate::records::RecordStoreError;

    #[test]
    fn directory_failure_surfaces_as_temporarily_unavailable() {
        let directory_error =
            DirectoryError::Store(RecordStoreError::Request("connection reset".to_owned()));
        let interface = ApplicationError::from(directory_error).into_interface("req-3");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable { ref message, .. } if message.contains("connection reset")
        ));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn correlation_id_travels_with_the_interface_error() {
        let interface =
            ApplicationError::Integration("airtable timed out".to_owned()).into_interface("req-4");

        assert_eq!(interface.correlation_id(), "req-4");
        assert_eq!(interface.to_string(), "service unavailable: airtable timed out");
    }
}
