pub mod command;
pub mod config;
pub mod download;
pub mod env_guard;
pub mod error;
pub mod geojson;
pub mod host;
pub mod mmap_utils;
pub mod parser;
pub mod path_translator;
pub mod pipeline;
pub mod platform;
pub mod provisioning;
pub mod runner;
pub mod types;

pub use command::{CommandBuilder, PreparedCommand, SeedFile};
pub use config::{BridgeMode, ToolchainConfig};
pub use error::{FlowlineError, Result};
pub use parser::{ParseMode, StreamlineParser};
pub use path_translator::PathTranslator;
pub use pipeline::{FlowlinePipeline, HostServices, RunOutcome};
pub use platform::{ExecContext, HostPlatform};
pub use provisioning::{ProvisionOptions, ProvisioningManager, ProvisioningState, Stage};
pub use runner::{CommandSpec, ProcessRunner, SystemRunner};
pub use types::*;
