use crate::error::{FlowlineError, Result};
use crate::path_translator::PathTranslator;
use crate::provisioning::ProvisioningStrategy;
use crate::runner::CommandSpec;
use crate::types::{RunParameters, SeedPoint};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Temporary `x y` file handed to grd2stream with `-f`, deleted on drop
#[derive(Debug)]
pub struct SeedFile {
    file: NamedTempFile,
}

impl SeedFile {
    pub fn create(seed: SeedPoint) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("grd2stream-seed-")
            .suffix(".txt")
            .tempfile()?;
        writeln!(file, "{} {}", seed.x, seed.y)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// A command ready to run, plus the seed file it references
#[derive(Debug)]
pub struct PreparedCommand {
    pub spec: CommandSpec,
    pub seed_file: SeedFile,
}

/// Turns validated run parameters into a grd2stream invocation
pub struct CommandBuilder<'a> {
    strategy: &'a dyn ProvisioningStrategy,
    output_file: Option<PathBuf>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(strategy: &'a dyn ProvisioningStrategy) -> Self {
        Self {
            strategy,
            output_file: None,
        }
    }

    /// Also write the raw tool output to `path` on the host
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn build(&self, params: &RunParameters) -> Result<PreparedCommand> {
        params.validate()?;
        let seed = params.seed.ok_or_else(|| {
            FlowlineError::InvalidParameters("A seed coordinate must be selected".to_string())
        })?;

        let seed_file = SeedFile::create(seed)?;
        let translator = self.strategy.translator();
        let args = tool_arguments(params, seed_file.path(), translator);
        let tool = translator.translate(&self.strategy.tool_executable());

        let mut spec = self.strategy.in_environment(&tool, &args);
        spec.stdout_file = self.output_file.clone();

        Ok(PreparedCommand { spec, seed_file })
    }
}

/// grd2stream arguments after the program name, in the order the tool documents them
pub fn tool_arguments(
    params: &RunParameters,
    seed_file: &Path,
    translator: PathTranslator,
) -> Vec<String> {
    let mut args = vec![
        translator.translate(&params.grid_1.source_uri),
        translator.translate(&params.grid_2.source_uri),
        "-f".to_string(),
        translator.translate_path(seed_file),
    ];

    if params.backward {
        args.push("-b".to_string());
    }
    if let Some(step) = params.step_size {
        args.push("-d".to_string());
        args.push(format!("{:?}", step));
    }
    if let Some(max_time) = params.max_integration_time {
        args.push("-T".to_string());
        args.push(format!("{:?}", max_time));
    }
    if let Some(max_steps) = params.max_steps {
        args.push("-n".to_string());
        args.push(max_steps.to_string());
    }
    if let Some(flag) = params.output_format.flag() {
        args.push(flag.to_string());
    }

    args
}
