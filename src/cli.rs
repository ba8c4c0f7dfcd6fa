use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::generator::GenerationOrchestrator;
use crate::integrations::LocalDocsProcessor;
use crate::types::{GenerationRequest, GenerationResult, SourceDocument};

#[derive(Parser, Debug)]
#[command(name = "copysmith")]
#[command(version, about = "Generate blog articles and LinkedIn posts with an LLM")]
pub struct Args {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one generation request and print the JSON result
    Generate {
        /// JSON file holding a generation request
        #[arg(short, long)]
        request: PathBuf,

        /// Source document to attach (PDF, Markdown or plain text)
        #[arg(short, long)]
        document: Option<PathBuf>,

        /// MIME type of the document; guessed from the extension when omitted
        #[arg(long, requires = "document")]
        mime: Option<String>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the JSON Schema of a generation request
    Schema,
    /// Write a configuration file with every default spelled out
    InitConfig {
        #[arg(default_value = "copysmith.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the parsed command. `Ok(false)` means the engine reported a
/// generation error, which has already been printed.
pub async fn run(args: Args) -> Result<bool> {
    match args.command {
        Command::Generate {
            request,
            document,
            mime,
            config,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            let request = load_request(&request, document.as_deref(), mime.as_deref())?;
            let engine = GenerationOrchestrator::from_config(config)?;

            match engine.generate_content(request).await {
                Ok(result) => {
                    write_result(&result, output.as_deref())?;
                    Ok(true)
                }
                Err(e) => {
                    let detail = serde_json::to_string_pretty(&e.detail())
                        .context("Failed to serialize error detail")?;
                    println!("{}", detail);
                    eprintln!("❌ Generation failed: {}", e);
                    Ok(false)
                }
            }
        }
        Command::Schema => {
            println!("{}", request_schema()?);
            Ok(true)
        }
        Command::InitConfig { path, force } => {
            write_default_config(&path, force)?;
            eprintln!("✅ Wrote default configuration to {:?}", path);
            Ok(true)
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    }
}

/// Read a request file and attach the document given on the command line.
pub fn load_request(
    path: &Path,
    document: Option<&Path>,
    mime: Option<&str>,
) -> Result<GenerationRequest> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {:?}", path))?;
    let mut request: GenerationRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse request file: {:?}", path))?;

    if let Some(doc_path) = document {
        let mime = match mime {
            Some(m) => m.to_string(),
            None => match LocalDocsProcessor::mime_for_path(doc_path) {
                Some(m) => m.to_string(),
                None => bail!("Cannot tell the type of {:?}; pass --mime", doc_path),
            },
        };
        let bytes = fs::read(doc_path)
            .with_context(|| format!("Failed to read document: {:?}", doc_path))?;
        let name = doc_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        request.source_document = Some(SourceDocument::from_bytes(mime, name, &bytes));
    }

    Ok(request)
}

pub fn request_schema() -> Result<String> {
    let schema = schemars::schema_for!(GenerationRequest);
    serde_json::to_string_pretty(&schema).context("Failed to serialize request schema")
}

pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{:?} already exists; use --force to overwrite", path);
    }
    let toml = Config::default().to_toml_string()?;
    fs::write(path, toml).with_context(|| format!("Failed to write config file: {:?}", path))
}

fn write_result(result: &GenerationResult, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write result: {:?}", path))?;
            eprintln!(
                "✅ {} ({} words, {:?}) written to {:?}",
                result.content_type, result.word_count, result.status, path
            );
        }
        None => println!("{}", json),
    }
    for warning in &result.warnings {
        eprintln!("⚠️  {:?}", warning);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "copysmith",
            "generate",
            "--request",
            "req.json",
            "--document",
            "case.pdf",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        assert!(matches!(
            args.command,
            Command::Generate { document: Some(_), mime: None, .. }
        ));

        assert!(Args::try_parse_from(["copysmith", "generate", "--request", "r.json", "--mime", "text/plain"]).is_err());
    }

    #[test]
    fn test_load_request_attaches_document() {
        let dir = tempfile::tempdir().unwrap();
        let request_path = dir.path().join("request.json");
        let doc_path = dir.path().join("acme.md");
        fs::write(
            &request_path,
            r#"{"content_type": "blog.case_study", "topic": "Acme"}"#,
        )
        .unwrap();
        fs::write(&doc_path, "# Acme\n\nAcme cut costs by 30%.").unwrap();

        let request = load_request(&request_path, Some(&doc_path), None).unwrap();
        assert_eq!(request.content_type, ContentType::CaseStudyBlog.as_str());
        let document = request.source_document.unwrap();
        assert_eq!(document.mime_type, "text/markdown");
        assert_eq!(document.name.as_deref(), Some("acme.md"));

        let unknown = dir.path().join("deck.key");
        fs::write(&unknown, "x").unwrap();
        assert!(load_request(&request_path, Some(&unknown), None).is_err());
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copysmith.toml");
        write_default_config(&path, false).unwrap();
        assert!(write_default_config(&path, false).is_err());
        write_default_config(&path, true).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.llm.model, Config::default().llm.model);
    }

    #[test]
    fn test_schema_describes_request() {
        let schema = request_schema().unwrap();
        assert!(schema.contains("content_type"));
        assert!(schema.contains("source_document"));
    }
}
