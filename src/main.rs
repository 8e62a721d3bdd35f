use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::Shell;
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

use tvpipe::capabilities::{AccelPolicy, HardwareCapabilities};
use tvpipe::catalog::known_steps;
use tvpipe::input::ConcatInput;
use tvpipe::lockfile::generate_lock;
use tvpipe::observability::{MetricsCollector, log_snapshot};
use tvpipe::presets::{PRESET_NAMES, generate_preset};
use tvpipe::profile::CopyProfile;
use tvpipe::request::{TranscodeRequest, expand_patterns};
use tvpipe::state::StreamMetadata;
use tvpipe::validation::validate_request;
use tvpipe::{CompiledPipeline, PipelineBuilder};

#[cfg(feature = "otel")]
use opentelemetry::KeyValue;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};

fn main() -> Result<()> {
    let Cli { command } = Cli::parse();

    let otlp_endpoint_for_tracing = match &command {
        Commands::Build { otlp_endpoint, .. } => otlp_endpoint.clone(),
        _ => None,
    };

    configure_tracing(otlp_endpoint_for_tracing.as_deref())?;

    let command_result: Result<()> = match command {
        Commands::Build {
            request,
            capabilities,
            accel_policy,
            output,
            metrics,
            otlp_endpoint: _,
        } => build_request(&request, capabilities.as_deref(), accel_policy, &output, &metrics),
        Commands::Concat {
            url,
            copy,
            output,
        } => {
            let builder = PipelineBuilder::new(HardwareCapabilities::software());
            let compiled = builder.concat(&ConcatInput { url }, &copy.into_profile())?;
            emit(&compiled, &output)
        }
        Commands::Segmenter {
            url,
            copy,
            output,
        } => {
            let builder = PipelineBuilder::new(HardwareCapabilities::software());
            let compiled = builder.wrap_segmenter(&ConcatInput { url }, &copy.into_profile())?;
            emit(&compiled, &output)
        }
        Commands::Resize {
            input,
            output_path,
            width,
            height,
            output,
        } => {
            let builder = PipelineBuilder::new(HardwareCapabilities::software());
            let compiled = builder.resize(&input, &output_path, width, height)?;
            emit(&compiled, &output)
        }
        Commands::ListSteps => {
            list_steps();
            Ok(())
        }
        Commands::Validate { request } => validate_request_cmd(&request),
        Commands::Lock {
            request,
            output,
            accel_policy,
        } => lock_request(&request, &output, accel_policy),
        Commands::Request { action } => request_command(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "tvpipe", &mut io::stdout());
            Ok(())
        }
    };

    #[cfg(feature = "otel")]
    if otlp_endpoint_for_tracing.is_some() {
        opentelemetry::global::shutdown_tracer_provider();
    }

    command_result
}

fn configure_tracing(otlp_endpoint: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            let tracer =
                opentelemetry_otlp::new_pipeline()
                    .tracing()
                    .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                        vec![KeyValue::new("service.name", "tvpipe")],
                    )))
                    .with_exporter(
                        opentelemetry_otlp::new_exporter()
                            .tonic()
                            .with_endpoint(endpoint),
                    )
                    .install_simple()?;

            tracing_subscriber::registry()
                .with(filter.clone())
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|err| anyhow!(err.to_string()))?;
        } else {
            tracing_subscriber::registry()
                .with(filter.clone())
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .try_init()
                .map_err(|err| anyhow!(err.to_string()))?;
        }
    }

    #[cfg(not(feature = "otel"))]
    {
        if let Some(endpoint) = otlp_endpoint {
            eprintln!(
                "warning: --otlp-endpoint '{}' requested but OpenTelemetry support is not enabled. Rebuild with --features otel.",
                endpoint
            );
        }

        tracing_subscriber::registry()
            .with(filter.clone())
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }

    Ok(())
}

fn build_request(
    request_path: &Path,
    capabilities_override: Option<&Path>,
    policy: AccelPolicy,
    output: &OutputArgs,
    metrics: &MetricsArgs,
) -> Result<()> {
    let request = TranscodeRequest::load(request_path)?;
    let capabilities = match capabilities_override {
        Some(path) => HardwareCapabilities::load(path)?,
        None => request.load_capabilities(base_dir(request_path))?,
    };

    let collector = MetricsCollector::global().clone();
    let builder = PipelineBuilder::new(capabilities).with_metrics(collector.clone());
    let compiled = request
        .compile(&builder, policy)
        .with_context(|| format!("Failed to build request: {}", request_path.display()))?;

    info!(
        request = %request_path.display(),
        kind = %request.job.kind(),
        steps = compiled.steps.len(),
        "Pipeline compiled"
    );

    emit(&compiled, output)?;
    write_metrics(&collector, metrics)
}

fn emit(compiled: &CompiledPipeline, output: &OutputArgs) -> Result<()> {
    let rendered = match output.format {
        OutputFormatArg::Args => compiled.command_line(),
        OutputFormatArg::Shell => compiled.shell_command(&output.program),
        OutputFormatArg::Json => serde_json::to_string_pretty(compiled)?,
    };

    match &output.output {
        Some(path) => {
            create_parent(path)?;
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write pipeline: {}", path.display()))?;
            info!(output = %path.display(), "Pipeline written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn write_metrics(collector: &MetricsCollector, metrics: &MetricsArgs) -> Result<()> {
    if !metrics.print_metrics && metrics.metrics_json.is_none() && metrics.metrics_prometheus.is_none()
    {
        return Ok(());
    }

    let snapshot = collector.snapshot();
    if metrics.print_metrics {
        log_snapshot(&snapshot);
    }
    if let Some(path) = &metrics.metrics_json {
        create_parent(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
        to_writer_pretty(file, &snapshot)
            .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
        info!(metrics = %path.display(), "Metrics JSON written");
    }
    if let Some(path) = &metrics.metrics_prometheus {
        create_parent(path)?;
        fs::write(path, snapshot.to_prometheus())
            .with_context(|| format!("Failed to write Prometheus metrics: {}", path.display()))?;
        info!(metrics = %path.display(), "Prometheus metrics written");
    }
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn base_dir(request_path: &Path) -> &Path {
    request_path.parent().unwrap_or_else(|| Path::new("."))
}

fn list_steps() {
    println!("Available steps:");
    let mut current = None;
    for (category, name) in known_steps() {
        if current != Some(category) {
            println!("{category}:");
            current = Some(category);
        }
        println!("- {name}");
    }
}

fn validate_request_cmd(request_path: &Path) -> Result<()> {
    let request = TranscodeRequest::load(request_path)?;
    let report = validate_request(&request, base_dir(request_path));

    for warning in &report.warnings {
        warn!(file = %request_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %request_path.display(), "Request validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %request_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Request validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn lock_request(request_path: &Path, output_path: &Path, policy: AccelPolicy) -> Result<()> {
    let request = TranscodeRequest::load(request_path)?;
    let report = validate_request(&request, base_dir(request_path));

    for warning in &report.warnings {
        warn!(file = %request_path.display(), "{warning}");
    }

    if !report.is_ok() {
        for error_msg in &report.errors {
            error!(file = %request_path.display(), "{error_msg}");
        }
        return Err(anyhow!(
            "Cannot generate lockfile due to {} validation error(s)",
            report.errors.len()
        ));
    }

    create_parent(output_path)?;
    let lock = generate_lock(&request, base_dir(request_path), policy, output_path)?;
    info!(
        lockfile = %output_path.display(),
        arguments = %lock.arguments_hash,
        "Lockfile generated successfully"
    );

    Ok(())
}

fn request_command(command: RequestCommands) -> Result<()> {
    match command {
        RequestCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("requests/{preset}.yaml")));
            let generated = generate_preset(&preset, &destination)?;
            info!(
                preset = %preset,
                path = %generated.display(),
                "Preset request generated"
            );
            Ok(())
        }
        RequestCommands::Lint { patterns } => lint_requests(&patterns),
        RequestCommands::Diff {
            lhs,
            rhs,
            accel_policy,
        } => diff_requests(&lhs, &rhs, accel_policy),
    }
}

fn lint_requests(patterns: &[String]) -> Result<()> {
    let requests = expand_patterns(patterns)?;
    let mut failures = 0usize;

    for request_path in &requests {
        match TranscodeRequest::load(request_path) {
            Ok(request) => {
                let report = validate_request(&request, base_dir(request_path));
                for warning in &report.warnings {
                    warn!(file = %request_path.display(), "{warning}");
                }
                if report.is_ok() {
                    info!(file = %request_path.display(), "Lint passed");
                } else {
                    failures += 1;
                    for error_msg in &report.errors {
                        error!(file = %request_path.display(), "{error_msg}");
                    }
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %request_path.display(), "Failed to load request: {err:#}");
            }
        }
    }

    if failures > 0 {
        bail!("Lint failed for {failures} request(s)");
    }

    info!(requests = requests.len(), "All request lint checks passed");
    Ok(())
}

fn compile_file(path: &Path, policy: AccelPolicy) -> Result<CompiledPipeline> {
    let request = TranscodeRequest::load(path)?;
    let builder = PipelineBuilder::new(request.load_capabilities(base_dir(path))?);
    request
        .compile(&builder, policy)
        .with_context(|| format!("Failed to build request: {}", path.display()))
}

/// Compares what two requests compile to, not how they are written.
fn diff_requests(lhs: &Path, rhs: &Path, policy: AccelPolicy) -> Result<()> {
    let left = compile_file(lhs, policy)?;
    let right = compile_file(rhs, policy)?;

    let mut differences = Vec::new();

    if left.environment != right.environment {
        differences.push(format!(
            "Environment differs: {:?} vs {:?}",
            left.environment, right.environment
        ));
    }

    let min_len = left.steps.len().min(right.steps.len());
    for (idx, (l_step, r_step)) in left.steps.iter().zip(right.steps.iter()).enumerate() {
        if l_step != r_step {
            differences.push(format!("Step {} differs: '{}' vs '{}'", idx + 1, l_step, r_step));
        }
    }
    for (extra_idx, step) in left.steps[min_len..].iter().enumerate() {
        differences.push(format!(
            "Extra step in left request at position {}: '{}'",
            min_len + extra_idx + 1,
            step
        ));
    }
    for (extra_idx, step) in right.steps[min_len..].iter().enumerate() {
        differences.push(format!(
            "Extra step in right request at position {}: '{}'",
            min_len + extra_idx + 1,
            step
        ));
    }

    let (left_args, right_args) = (left.command_line(), right.command_line());
    if left_args != right_args {
        differences.push(format!("Arguments differ:\n  {left_args}\n  {right_args}"));
    }

    if left.final_state != right.final_state {
        differences.push(format!(
            "Final frame differs: {} vs {}",
            left.final_state.describe(),
            right.final_state.describe()
        ));
    }

    if differences.is_empty() {
        info!(
            left = %lhs.display(),
            right = %rhs.display(),
            "Requests are equivalent"
        );
        println!("Requests match: {} == {}", lhs.display(), rhs.display());
        Ok(())
    } else {
        println!(
            "Request differences between '{}' and '{}':",
            lhs.display(),
            rhs.display()
        );
        for diff in &differences {
            println!("- {diff}");
        }
        bail!("Requests differ ({} difference(s) found)", differences.len());
    }
}

#[derive(Parser)]
#[command(
    name = "tvpipe",
    version,
    about = "Compiles transcoding requests into ffmpeg command lines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormatArg {
    /// Arguments joined by spaces.
    Args,
    /// Environment and program, shell quoted.
    Shell,
    /// The compiled pipeline with its final frame state.
    Json,
}

#[derive(clap::Args)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormatArg::Args)]
    format: OutputFormatArg,
    /// Program name for `--format shell`.
    #[arg(long, default_value = "ffmpeg")]
    program: String,
    /// Write to a file instead of stdout.
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct MetricsArgs {
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
    #[arg(long = "metrics-prometheus")]
    metrics_prometheus: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CopyArgs {
    #[arg(long)]
    threads: Option<u32>,
    /// Directory for engine reports.
    #[arg(long = "save-report")]
    save_report: Option<PathBuf>,
    #[arg(long = "service-provider")]
    service_provider: Option<String>,
    #[arg(long = "service-name")]
    service_name: Option<String>,
}

impl CopyArgs {
    fn into_profile(self) -> CopyProfile {
        CopyProfile {
            thread_count: self.threads,
            save_report: self.save_report,
            metadata: StreamMetadata {
                service_provider: self.service_provider,
                service_name: self.service_name,
                ..StreamMetadata::default()
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a request file.
    Build {
        #[arg(value_hint = ValueHint::FilePath)]
        request: PathBuf,
        /// Capability report replacing the one named in the request.
        #[arg(long)]
        capabilities: Option<PathBuf>,
        #[arg(long = "accel-policy", value_enum, default_value_t = AccelPolicy::Fallback)]
        accel_policy: AccelPolicy,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        metrics: MetricsArgs,
        #[arg(long = "otlp-endpoint")]
        otlp_endpoint: Option<String>,
    },
    /// Loop a concat playlist into MPEG-TS.
    Concat {
        url: String,
        #[command(flatten)]
        copy: CopyArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Re-wrap a segmenter playlist into MPEG-TS.
    Segmenter {
        url: String,
        #[command(flatten)]
        copy: CopyArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Resize an image.
    Resize {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        output_path: PathBuf,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[command(flatten)]
        output: OutputArgs,
    },
    ListSteps,
    Validate {
        request: PathBuf,
    },
    Lock {
        request: PathBuf,
        output: PathBuf,
        #[arg(long = "accel-policy", value_enum, default_value_t = AccelPolicy::Fallback)]
        accel_policy: AccelPolicy,
    },
    Request {
        #[command(subcommand)]
        action: RequestCommands,
    },
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RequestCommands {
    New {
        #[arg(long, value_parser = PRESET_NAMES)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Lint {
        /// Request files or glob patterns.
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    Diff {
        lhs: PathBuf,
        rhs: PathBuf,
        #[arg(long = "accel-policy", value_enum, default_value_t = AccelPolicy::Fallback)]
        accel_policy: AccelPolicy,
    },
}
