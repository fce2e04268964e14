use crate::command::CommandBuilder;
use crate::config::ToolchainConfig;
use crate::error::{FlowlineError, Result};
use crate::host::{
    pick_seed, CoordinatePicker, FeatureSink, RetryPrompt, StatusMessage, StatusReporter,
};
use crate::parser::{ParseMode, StreamlineParser};
use crate::provisioning::{ProvisionOptions, ProvisioningManager, ProvisioningState};
use crate::types::{ParsedDataset, RunParameters};
use std::path::PathBuf;

pub const DEFAULT_LAYER_NAME: &str = "Streamline";

/// Collaborators supplied by the hosting application for one run
pub struct HostServices<'a> {
    pub sink: &'a dyn FeatureSink,
    pub reporter: &'a dyn StatusReporter,
    pub prompt: &'a dyn RetryPrompt,
    /// Asked for a seed when the parameters carry none
    pub picker: Option<&'a dyn CoordinatePicker>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub layer_id: String,
    pub dataset: ParsedDataset,
    /// The executed command as shown in logs
    pub command: String,
    /// None when provisioning was skipped
    pub provisioning: Option<ProvisioningState>,
}

/// ensure_ready, build, execute, parse, load
pub struct FlowlinePipeline {
    manager: ProvisioningManager,
    options: ProvisionOptions,
    parse_mode: ParseMode,
    output_file: Option<PathBuf>,
    provision: bool,
    layer_name: String,
}

impl FlowlinePipeline {
    pub fn new(config: ToolchainConfig) -> Self {
        Self::with_manager(ProvisioningManager::new(config))
    }

    pub fn with_manager(manager: ProvisioningManager) -> Self {
        Self {
            manager,
            options: ProvisionOptions::default(),
            parse_mode: ParseMode::Tolerant,
            output_file: None,
            provision: true,
            layer_name: DEFAULT_LAYER_NAME.to_string(),
        }
    }

    pub fn with_options(mut self, options: ProvisionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }

    /// Keep the raw grd2stream output in `path`
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// Skip `ensure_ready` and run whatever binary is configured
    pub fn with_provisioning(mut self, provision: bool) -> Self {
        self.provision = provision;
        self
    }

    pub fn with_layer_name(mut self, name: impl Into<String>) -> Self {
        self.layer_name = name.into();
        self
    }

    pub fn manager(&self) -> &ProvisioningManager {
        &self.manager
    }

    /// Run the whole pipeline once
    ///
    /// Every failure is pushed to the reporter as a critical message before it
    /// is returned, so hosts only need to map the error to their own exit path.
    pub async fn run(&self, params: RunParameters, host: &HostServices<'_>) -> Result<RunOutcome> {
        match self.run_stages(params, host).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::error!("Flowline run failed: {}", e);
                host.reporter.push(StatusMessage::from_error(&e));
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        mut params: RunParameters,
        host: &HostServices<'_>,
    ) -> Result<RunOutcome> {
        if params.seed.is_none() {
            if let Some(picker) = host.picker {
                params.seed = Some(pick_seed(picker).await?);
            }
        }
        params.validate()?;

        let provisioning = if self.provision {
            let state = self.manager.ensure_ready(&self.options, host.prompt).await?;
            Some(state)
        } else {
            None
        };

        let mut builder = CommandBuilder::new(self.manager.strategy());
        if let Some(ref file) = self.output_file {
            builder = builder.with_output_file(file);
        }
        let prepared = builder.build(&params)?;
        let command = prepared.spec.display();
        log::info!("Executing grd2stream command: {}", command);

        let result = self.manager.runner().execute_checked(&prepared.spec).await?;
        drop(prepared);

        let dataset = StreamlineParser::new(params.output_format)
            .with_mode(self.parse_mode)
            .parse_checked(&result.stdout)?;
        if dataset.is_empty() {
            return Err(FlowlineError::OutputMalformed(
                "grd2stream produced no valid rows".to_string(),
            ));
        }

        let layer_id = host.sink.load(&self.layer_name, &dataset)?;

        if dataset.is_partial() {
            host.reporter.push(StatusMessage::warning(
                "Partial result",
                format!(
                    "Layer '{}' loaded with {} points, {} malformed rows skipped.",
                    self.layer_name,
                    dataset.len(),
                    dataset.dropped_rows
                ),
            ));
        } else {
            host.reporter.push(StatusMessage::success(
                "Success",
                format!("Layer '{}' successfully loaded.", self.layer_name),
            ));
        }

        Ok(RunOutcome {
            layer_id,
            dataset,
            command,
            provisioning,
        })
    }
}
