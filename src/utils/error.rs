use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Pickle encoding error: {0}")]
    PickleError(#[from] serde_pickle::Error),

    #[error("Tensor error: {0}")]
    TensorError(#[from] candle_core::Error),

    #[error("Invalid {field}: {message}")]
    InvalidChoiceError { field: String, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Checkpoint error ({path}): {message}")]
    CheckpointError { path: String, message: String },

    #[error("Environment error: {message}")]
    EnvironmentError { message: String },

    #[error("Unknown algorithm: {name}")]
    UnknownAlgorithm { name: String },

    #[error("Please input the correct strategy, e.g. pg or q (got '{name}').")]
    UnsupportedStrategy { name: String },

    #[error("Not implemented: {message}")]
    NotImplemented { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Model,
    Simulation,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EvalError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::EnvironmentError {
            message: message.into(),
        }
    }

    pub fn checkpoint(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CheckpointError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidChoiceError { .. }
            | Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::YamlError(_)
            | Self::SerializationError(_) => ErrorCategory::Configuration,
            Self::IoError(_) | Self::CsvError(_) => ErrorCategory::Input,
            Self::CheckpointError { .. }
            | Self::TensorError(_)
            | Self::UnknownAlgorithm { .. }
            | Self::UnsupportedStrategy { .. }
            | Self::NotImplemented { .. } => ErrorCategory::Model,
            Self::EnvironmentError { .. } => ErrorCategory::Simulation,
            Self::PickleError(_) => ErrorCategory::Output,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidChoiceError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigError { .. }
            | Self::YamlError(_)
            | Self::UnknownAlgorithm { .. }
            | Self::UnsupportedStrategy { .. } => ErrorSeverity::High,
            // 檔案可能暫時無法存取
            Self::IoError(_) => ErrorSeverity::Medium,
            Self::NotImplemented { .. } | Self::PickleError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InvalidChoiceError { .. } => {
                "Check the --difficulty, --scenario and --mode flags against the accepted values"
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => {
                "Review the YAML files under --args-dir for the reported field"
            }
            Self::YamlError(_) | Self::SerializationError(_) => {
                "Make sure the argument files exist and are valid YAML"
            }
            Self::IoError(_) => "Verify that the referenced files exist and are readable",
            Self::CsvError(_) => "Check the scenario profile CSV files for malformed rows",
            Self::CheckpointError { .. } | Self::TensorError(_) => {
                "Confirm --save-path and the log name point to a checkpoint trained with the same arguments"
            }
            Self::UnknownAlgorithm { .. } => "Pass an --alg value present in the registry",
            Self::UnsupportedStrategy { .. } | Self::NotImplemented { .. } => {
                "Use an algorithm with the pg strategy"
            }
            Self::EnvironmentError { .. } => "Check the scenario data under env_args.data_path",
            Self::PickleError(_) => "Check the record contents and the --record-dir permissions",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Could not read input: {}", self),
            ErrorCategory::Model => format!("Policy setup failed: {}", self),
            ErrorCategory::Simulation => format!("Environment failed: {}", self),
            ErrorCategory::Output => format!("Could not write the test record: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
