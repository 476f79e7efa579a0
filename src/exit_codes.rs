//! Process exit codes for scripting.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments, including an invalid clip range or timestamp
    InvalidArguments = 2,
    /// Recording, video file or detection ordinal does not exist
    NotFound = 3,
    /// Export finished but at least one segment failed or was cancelled
    PartialFailure = 4,
    UserCancelled = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::GeneralError => write!(f, "general error"),
            ExitCode::InvalidArguments => write!(f, "invalid arguments"),
            ExitCode::NotFound => write!(f, "not found"),
            ExitCode::PartialFailure => write!(f, "partial failure"),
            ExitCode::UserCancelled => write!(f, "user cancelled"),
        }
    }
}
