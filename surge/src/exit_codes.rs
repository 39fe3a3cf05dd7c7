/// Process exit status. Scripts and CI gates key off these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    ChecksFailed = 10,
    ThresholdsFailed = 11,
    ChecksAndThresholdsFailed = 12,
    /// Bad flags, unreadable or invalid scenario files, undefined variables.
    InvalidInput = 30,
    RuntimeError = 40,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        i32::from(self as u8)
    }

    pub fn from_quality_gates(checks_failed: bool, thresholds_failed: bool) -> Self {
        if checks_failed && thresholds_failed {
            Self::ChecksAndThresholdsFailed
        } else if thresholds_failed {
            Self::ThresholdsFailed
        } else if checks_failed {
            Self::ChecksFailed
        } else {
            Self::Success
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}
