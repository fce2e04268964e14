use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowlineError {
    #[error("Conda runtime is missing: {0}")]
    RuntimeMissing(String),

    #[error("Conda environment setup failed: {0}")]
    EnvironmentSetupFailed(String),

    #[error("Building grd2stream failed: {0}")]
    BuildFailed(String),

    #[error("grd2stream verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("grd2stream failed with {}: {stderr}", describe_exit(.code))]
    ExternalToolFailed { code: Option<i32>, stderr: String },

    #[error("Failed to load output as a layer: {0}")]
    OutputMalformed(String),

    #[error("Failed to start process: {0}")]
    SpawnFailed(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl FlowlineError {
    /// Errors after which the caller may offer a retry within the same run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FlowlineError::EnvironmentSetupFailed(_) | FlowlineError::VerificationFailed(_)
        )
    }

    /// Short heading used for user-facing status messages.
    pub fn title(&self) -> &'static str {
        match self {
            FlowlineError::RuntimeMissing(_) => "Conda missing",
            FlowlineError::EnvironmentSetupFailed(_) => "Environment setup failed",
            FlowlineError::BuildFailed(_) => "Installation failed",
            FlowlineError::VerificationFailed(_) => "Verification failed",
            FlowlineError::InvalidParameters(_) => "Invalid selection",
            FlowlineError::ExternalToolFailed { .. } => "grd2stream failed",
            FlowlineError::OutputMalformed(_) => "Layer not created",
            _ => "Error",
        }
    }

    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            FlowlineError::RuntimeMissing(_)
                | FlowlineError::EnvironmentSetupFailed(_)
                | FlowlineError::BuildFailed(_)
                | FlowlineError::VerificationFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowlineError>;
