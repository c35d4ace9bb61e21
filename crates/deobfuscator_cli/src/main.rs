#![deny(unused_crate_dependencies)]

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use deobfuscator::{deobfuscate_with_options, Config, TransformationKey};
use deobfuscator_swc_runner::RunOptions;
use tracing_subscriber::EnvFilter;

/// Deobfuscate JavaScript produced by obfuscator.io style obfuscators
#[derive(Parser, Debug)]
#[command(name = "deobfuscate")]
struct Args {
  /// File to read, `-` or nothing for stdin
  input: Option<PathBuf>,
  /// File to write, stdout when absent
  #[arg(short, long)]
  output: Option<PathBuf>,
  /// JSON file with one entry per pass, e.g. `{ "stringRevealing": { "isEnabled": true } }`
  #[arg(short, long)]
  config: Option<PathBuf>,
  /// Write a source map of the output to this file
  #[arg(long)]
  source_map: Option<PathBuf>,
  /// Disable a pass, e.g. `--disable controlFlowRecovery`
  #[arg(long, value_name = "KEY")]
  disable: Vec<TransformationKey>,
  /// Only log warnings
  #[arg(long)]
  silent: bool,
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();

  let mut config = match &args.config {
    Some(path) => {
      let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
      Config::from_json(&json).with_context(|| format!("Invalid config {}", path.display()))?
    }
    None => Config::default(),
  };
  config.silent |= args.silent;
  for key in &args.disable {
    config.disable(*key);
  }

  let default_level = if config.silent { "warn" } else { "info" };
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
    )
    .init();

  let (source, file_name) = match &args.input {
    Some(path) if path.as_os_str() != "-" => (
      std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?,
      Some(path.display().to_string()),
    ),
    _ => {
      let mut source = String::new();
      std::io::stdin()
        .read_to_string(&mut source)
        .context("Failed to read stdin")?;
      (source, None)
    }
  };

  let options = RunOptions {
    file_name,
    source_map: args.source_map.is_some(),
  };
  let output = deobfuscate_with_options(&source, &config, &options)?;
  tracing::debug!(
    iterations = output.iterations,
    diagnostics = output.diagnostics.len(),
    "Deobfuscated"
  );

  match &args.output {
    Some(path) => std::fs::write(path, &output.code)
      .with_context(|| format!("Failed to write {}", path.display()))?,
    None => std::io::stdout()
      .write_all(output.code.as_bytes())
      .context("Failed to write stdout")?,
  }

  if let (Some(path), Some(source_map)) = (&args.source_map, &output.source_map) {
    std::fs::write(path, source_map)
      .with_context(|| format!("Failed to write source map {}", path.display()))?;
  }

  Ok(())
}
