use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    /// Bad flags, unreadable or malformed scenario files, invalid configuration.
    InvalidInput(anyhow::Error),
    /// The run itself failed (task join errors, output failures).
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Configuration errors are the user's input; anything else happened while running.
    pub(crate) fn from_core(context: &'static str, err: surge_core::runner::Error) -> Self {
        let kind = if err.is_config() {
            Self::InvalidInput
        } else {
            Self::RuntimeError
        };
        kind(anyhow::Error::new(err).context(context))
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::runner::Error;

    #[test]
    fn config_errors_are_invalid_input() {
        let err = RunError::from_core("invalid scenario config", Error::NoScenarios);
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().starts_with("invalid scenario config: "));
    }

    #[test]
    fn other_core_errors_are_runtime_errors() {
        let err = RunError::from_core("run failed", Error::AlreadyStarted("s1".to_string()));
        assert_eq!(err.exit_code(), ExitCode::RuntimeError);
    }
}
