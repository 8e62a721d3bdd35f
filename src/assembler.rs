//! Folds an ordered step list into engine arguments.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::PipelineError;
use crate::state::FrameState;
use crate::step::{BoxedStep, EnvironmentVariable, InputKind, PipelineStep};

/// Chain of the filter graph a filter step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterSlot {
    Video,
    Audio,
    /// Source chain of the n-th overlay layer; runs on the layer's own
    /// stream, so it is not folded into the main video state.
    LayerSource(usize),
    LayerOverlay(usize),
    PixelFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Attachment {
    Pipeline,
    Input(usize),
    Filter(FilterSlot),
}

#[derive(Debug)]
pub struct PlannedStep {
    pub step: BoxedStep,
    pub attachment: Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFile {
    pub path: String,
    pub kind: InputKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledInput {
    pub path: String,
    pub kind: InputKind,
    pub options: Vec<String>,
}

/// Result of a build: everything needed to start the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledPipeline {
    pub environment: Vec<EnvironmentVariable>,
    pub global_options: Vec<String>,
    pub inputs: Vec<CompiledInput>,
    pub filter_options: Vec<String>,
    pub output_options: Vec<String>,
    pub final_state: FrameState,
    /// Step names in fold order.
    pub steps: Vec<String>,
}

impl CompiledPipeline {
    /// Arguments in engine order: global, per input, filter, output.
    pub fn arguments(&self) -> Vec<String> {
        let mut arguments = self.global_options.clone();
        for input in &self.inputs {
            arguments.extend(input.options.iter().cloned());
            arguments.push("-i".to_string());
            arguments.push(input.path.clone());
        }
        arguments.extend(self.filter_options.iter().cloned());
        arguments.extend(self.output_options.iter().cloned());
        arguments
    }

    pub fn command_line(&self) -> String {
        self.arguments().join(" ")
    }

    /// `KEY=value ffmpeg args...` with shell quoting.
    pub fn shell_command(&self, program: &str) -> String {
        let mut words: Vec<String> = self
            .environment
            .iter()
            .map(|var| format!("{}={}", var.key, shell_quote(&var.value)))
            .collect();
        words.push(shell_quote(program));
        words.extend(self.arguments().iter().map(|arg| shell_quote(arg)));
        words.join(" ")
    }

    pub fn has_step(&self, name: &str) -> bool {
        self.steps.iter().any(|step| step == name)
    }
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,%@".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Ordered steps and the input files they attach to.
///
/// Steps are folded in exactly the order they were added.
#[derive(Debug, Default)]
pub struct Assembler {
    inputs: Vec<InputFile>,
    steps: Vec<PlannedStep>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the input reading `path`; a path is only opened once.
    pub fn add_input(&mut self, path: impl Into<String>, kind: InputKind) -> usize {
        let path = path.into();
        if let Some(index) = self.inputs.iter().position(|input| input.path == path) {
            return index;
        }
        self.inputs.push(InputFile { path, kind });
        self.inputs.len() - 1
    }

    pub fn inputs(&self) -> &[InputFile] {
        &self.inputs
    }

    pub fn push(&mut self, step: impl PipelineStep + 'static, attachment: Attachment) {
        self.push_boxed(Box::new(step), attachment);
    }

    pub fn push_boxed(&mut self, step: BoxedStep, attachment: Attachment) {
        self.steps.push(PlannedStep { step, attachment });
    }

    pub fn insert(
        &mut self,
        index: usize,
        step: impl PipelineStep + 'static,
        attachment: Attachment,
    ) {
        let index = index.min(self.steps.len());
        self.steps.insert(
            index,
            PlannedStep {
                step: Box::new(step),
                attachment,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Filter fragments attached to `slot`, in order.
    pub fn filters(&self, slot: FilterSlot) -> Vec<String> {
        self.steps
            .iter()
            .filter(|planned| planned.attachment == Attachment::Filter(slot))
            .filter_map(|planned| planned.step.filter())
            .collect()
    }

    #[instrument(skip_all, fields(steps = self.steps.len(), inputs = self.inputs.len()))]
    pub fn assemble(self, initial: FrameState) -> Result<CompiledPipeline, PipelineError> {
        let mut state = initial;
        let mut environment: Vec<EnvironmentVariable> = Vec::new();
        let mut global_options = Vec::new();
        let mut input_options: Vec<Vec<String>> = vec![Vec::new(); self.inputs.len()];
        let mut filter_options = Vec::new();
        let mut output_options = Vec::new();
        let mut names = Vec::with_capacity(self.steps.len());

        for PlannedStep { step, attachment } in &self.steps {
            if let Attachment::Input(index) = attachment {
                let input = self.inputs.get(*index).ok_or_else(|| {
                    PipelineError::InvalidRequest(format!(
                        "step '{}' is attached to missing input {index}",
                        step.name()
                    ))
                })?;
                if !step.applies_to(input.kind) {
                    return Err(PipelineError::InconsistentStep {
                        step: step.name().to_string(),
                        input: input.kind,
                    });
                }
                input_options[*index].extend(step.input_options(input.kind));
            }

            if !matches!(attachment, Attachment::Filter(FilterSlot::LayerSource(_))) {
                step.check(&state)?;
                state = step.next_state(&state);
            }

            for variable in step.environment_variables() {
                match environment.iter_mut().find(|v| v.key == variable.key) {
                    Some(existing) => existing.value = variable.value,
                    None => environment.push(variable),
                }
            }
            global_options.extend(step.global_options());
            filter_options.extend(step.filter_options());
            output_options.extend(step.output_options());

            debug!(step = step.name(), state = %state.describe(), "folded step");
            names.push(step.name().to_string());
        }

        let inputs = self
            .inputs
            .into_iter()
            .zip(input_options)
            .map(|(input, options)| CompiledInput {
                path: input.path,
                kind: input.kind,
                options,
            })
            .collect();

        Ok(CompiledPipeline {
            environment,
            global_options,
            inputs,
            filter_options,
            output_options,
            final_state: state,
            steps: names,
        })
    }
}
