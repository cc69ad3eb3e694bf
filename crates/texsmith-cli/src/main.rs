//! texsmith - generate, compile and repair LaTeX documents
//!
//! ## Commands
//!
//! - `generate`: run a request inline and write the PDF
//! - `submit`: run a request through the dispatcher (callback delivery)
//! - `compile`: compile an existing `.tex` file without generation
//! - `sanitize`: print the sanitized body of generated text

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use texsmith_core::compiler::is_reserved_file_name;
use texsmith_core::{
    sanitize, CompileOutcome, Dispatcher, DocumentCompiler, GenerationRequest, HttpCallbackSink,
    ImagePayloads, PdfLatexCompiler, Pipeline, PipelineResult, ServiceConfig, Submission,
};

#[derive(Parser)]
#[command(name = "texsmith")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate LaTeX with an LLM and repair it until pdflatex accepts it", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a generation request inline and write the resulting PDF
    Generate {
        /// Request file (JSON), or `-` for stdin
        request: PathBuf,

        /// Where to write the PDF
        #[arg(short, long, default_value = "document.pdf")]
        output: PathBuf,

        /// Also write the full result (JSON, PDF as base64) here
        #[arg(long)]
        result: Option<PathBuf>,
    },

    /// Submit a request; with a callback target it is acknowledged at once
    /// and the result is POSTed when ready
    Submit {
        /// Request file (JSON), or `-` for stdin
        request: PathBuf,
    },

    /// Compile an existing LaTeX source without generation
    Compile {
        /// Source file
        source: PathBuf,

        /// Image to place beside the source, as `name=path` (repeatable)
        #[arg(short, long = "image", value_parser = parse_image)]
        images: Vec<(String, PathBuf)>,

        /// Where to write the PDF
        #[arg(short, long, default_value = "document.pdf")]
        output: PathBuf,
    },

    /// Print the sanitized form of generated LaTeX
    Sanitize {
        /// Input file, or `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    texsmith_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Sanitize { input } => {
            print!("{}", cmd_sanitize(&input)?);
            Ok(())
        }
        Commands::Compile {
            source,
            images,
            output,
        } => {
            let config = load_config()?;
            cmd_compile(&config, &source, &images, &output).await
        }
        Commands::Generate {
            request,
            output,
            result,
        } => {
            let config = load_config()?;
            cmd_generate(config, &request, &output, result.as_deref()).await
        }
        Commands::Submit { request } => {
            let config = load_config()?;
            cmd_submit(config, &request).await
        }
    }
}

/// Read configuration from the environment, after loading `.env` if present.
fn load_config() -> Result<Arc<ServiceConfig>> {
    dotenvy::dotenv().ok();
    let config = ServiceConfig::from_env().context("Invalid texsmith configuration")?;
    Ok(Arc::new(config))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_sanitize(input: &Path) -> Result<String> {
    let raw = read_input(input)?;
    let mut out = sanitize(&raw);
    out.push('\n');
    Ok(out)
}

async fn cmd_compile(
    config: &ServiceConfig,
    source: &Path,
    images: &[(String, PathBuf)],
    output: &Path,
) -> Result<()> {
    let text = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let payloads = load_images(images)?;

    let compiler = PdfLatexCompiler::new(config.engine.clone());
    match compiler.compile(&text, &payloads).await {
        CompileOutcome::Success(artifact) => {
            std::fs::write(output, &artifact.pdf)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(bytes = artifact.size_bytes(), path = %output.display(), "PDF written");
            print_json(&serde_json::json!({
                "success": true,
                "pdf_size_bytes": artifact.size_bytes(),
                "warnings": artifact.warnings,
                "output": output,
            }))
        }
        CompileOutcome::Failure(failure) => {
            print_json(&serde_json::json!({
                "success": false,
                "kind": failure.kind,
                "diagnostic": failure.diagnostic,
            }))?;
            bail!("Compilation failed ({:?})", failure.kind)
        }
    }
}

async fn cmd_generate(
    config: Arc<ServiceConfig>,
    request: &Path,
    output: &Path,
    result_path: Option<&Path>,
) -> Result<()> {
    let request = read_request(request)?;
    let pipeline = Pipeline::from_config(config).context("Failed to build generation client")?;

    let result = pipeline.run(&request).await;

    if let Some(path) = result_path {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(pdf) = &result.pdf {
        std::fs::write(output, pdf)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!(path = %output.display(), "PDF written");
    }
    print_json(&ResultSummary::from(&result))?;

    if !result.success {
        bail!("Generation failed after {} attempt(s)", result.attempts);
    }
    Ok(())
}

async fn cmd_submit(config: Arc<ServiceConfig>, request: &Path) -> Result<()> {
    let request = read_request(request)?;
    let callback_timeout = Duration::from_secs(config.delivery.callback_timeout_secs);
    let pipeline = Pipeline::from_config(config).context("Failed to build generation client")?;
    let sink = HttpCallbackSink::new(callback_timeout).context("Failed to build callback client")?;
    let dispatcher = Dispatcher::new(Arc::new(pipeline), Arc::new(sink));

    match dispatcher.submit(request).await {
        Submission::Accepted(ack) => print_json(&ack)?,
        Submission::Completed(result) => print_json(&ResultSummary::from(&result))?,
    }

    // A one-shot process must outlive its deferred job.
    dispatcher.drain().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Result without the PDF payload, for terminal output.
#[derive(Debug, Serialize)]
struct ResultSummary<'a> {
    delivery_id: &'a str,
    success: bool,
    attempts: u32,
    warning_passes: u32,
    model: &'a str,
    pdf_size_bytes: Option<usize>,
    pdf_sha256: Option<&'a str>,
    warnings: &'a [String],
    diagnostic: Option<&'a str>,
}

impl<'a> From<&'a PipelineResult> for ResultSummary<'a> {
    fn from(result: &'a PipelineResult) -> Self {
        Self {
            delivery_id: &result.delivery_id,
            success: result.success,
            attempts: result.attempts,
            warning_passes: result.warning_passes,
            model: &result.model,
            pdf_size_bytes: result.pdf_size_bytes,
            pdf_sha256: result.pdf_sha256.as_deref(),
            warnings: &result.warnings,
            diagnostic: result.diagnostic.as_deref(),
        }
    }
}

fn parse_image(value: &str) -> std::result::Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected name=path, got {value:?}")),
    }
}

fn load_images(images: &[(String, PathBuf)]) -> Result<ImagePayloads> {
    let mut payloads = ImagePayloads::new();
    for (name, path) in images {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("Image name {name:?} must be a bare file name");
        }
        if is_reserved_file_name(name) {
            bail!("Image name {name:?} is reserved for the engine's job files");
        }
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
        payloads.insert(name.clone(), bytes);
    }
    Ok(payloads)
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn read_request(path: &Path) -> Result<GenerationRequest> {
    let raw = read_input(path)?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid request in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compile_with_images() {
        let cli = Cli::try_parse_from([
            "texsmith",
            "compile",
            "lesson.tex",
            "--image",
            "logo.png=assets/logo.png",
            "-i",
            "chart.pdf=/tmp/chart.pdf",
        ])
        .unwrap();
        match cli.command {
            Commands::Compile { source, images, output } => {
                assert_eq!(source, PathBuf::from("lesson.tex"));
                assert_eq!(images.len(), 2);
                assert_eq!(images[0], ("logo.png".to_string(), PathBuf::from("assets/logo.png")));
                assert_eq!(output, PathBuf::from("document.pdf"));
            }
            _ => panic!("expected compile"),
        }
    }

    #[test]
    fn test_parse_image_rejects_missing_separator() {
        assert!(parse_image("logo.png").is_err());
        assert!(parse_image("=x").is_err());
        assert!(parse_image("a=").is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["texsmith", "sanitize", "--json", "-v"]).unwrap();
        assert!(cli.json);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Sanitize { .. }));
    }

    #[test]
    fn test_sanitize_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.txt");
        std::fs::write(&path, "```latex\n\\begin{document}\nOi\n").unwrap();

        let out = cmd_sanitize(&path).unwrap();
        assert_eq!(out, "\\begin{document}\nOi\n\\end{document}\n");
    }

    #[test]
    fn test_read_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"system_prompt":"s","user_prompt":"u","preamble":"\\documentclass{article}","max_tokens":10,
                "callback":{"url":"https://example.com/hook","token":"t"}}"#,
        )
        .unwrap();

        let request = read_request(&path).unwrap();
        assert!(request.is_deferred());
        assert_eq!(request.max_tokens, 10);
    }

    #[test]
    fn test_load_images_rejects_paths_as_names() {
        let images = vec![("../x.png".to_string(), PathBuf::from("x.png"))];
        assert!(load_images(&images).is_err());

        let images = vec![("document.tex".to_string(), PathBuf::from("x.tex"))];
        let err = load_images(&images).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[tokio::test]
    async fn test_compile_missing_source_is_error() {
        let config = ServiceConfig::default();
        let err = cmd_compile(
            &config,
            Path::new("/nonexistent/lesson.tex"),
            &[],
            Path::new("out.pdf"),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
