use std::net::SocketAddr;
use std::path::PathBuf;

use psmcp_backend_core::api::server::{default_script_executor, serve};
use psmcp_backend_core::api::tools::batch_crop_payload;
use psmcp_backend_core::default_app_root_from_manifest_dir;
use psmcp_backend_core::pipeline::batch_crop::{BatchCropParams, BatchCropService};
use psmcp_backend_core::pipeline::settings::load_bridge_settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("batch-crop") => {
            run_batch_crop_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
            return Ok(());
        }
        Some("-h" | "--help") => {
            print_usage();
            return Ok(());
        }
        _ => {}
    }

    let serve_args = if matches!(cli_args.first().map(String::as_str), Some("serve")) {
        &cli_args[1..]
    } else {
        &cli_args[..]
    };
    let common = parse_common_args(serve_args)?;
    let settings = load_bridge_settings(common.app_root.as_path(), common.settings.as_deref())?;
    let addr: SocketAddr = settings.bind.parse()?;

    serve(addr, settings).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CommonCliArgs {
    app_root: PathBuf,
    settings: Option<String>,
}

fn parse_common_args(args: &[String]) -> Result<CommonCliArgs, Box<dyn std::error::Error>> {
    let mut common = CommonCliArgs {
        app_root: default_app_root_from_manifest_dir(),
        settings: None,
    };
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--app-root" => {
                common.app_root = PathBuf::from(flag_value(args, i)?);
                i += 2;
            }
            "--settings" => {
                common.settings = Some(flag_value(args, i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }
    Ok(common)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BatchCropCliArgs {
    common: CommonCliArgs,
    params: BatchCropParams,
}

fn parse_batch_crop_cli_args(
    args: &[String],
) -> Result<BatchCropCliArgs, Box<dyn std::error::Error>> {
    let mut common_args = Vec::new();
    let mut params = BatchCropParams::default();

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--input" => {
                params.input_folder = Some(flag_value(args, i)?);
                i += 2;
            }
            "--output" => {
                params.output_folder = Some(flag_value(args, i)?);
                i += 2;
            }
            "--width" => {
                params.width = Some(parse_number(flag, flag_value(args, i)?.as_str())?);
                i += 2;
            }
            "--height" => {
                params.height = Some(parse_number(flag, flag_value(args, i)?.as_str())?);
                i += 2;
            }
            "--count" => {
                params.count = Some(parse_number(flag, flag_value(args, i)?.as_str())?);
                i += 2;
            }
            "--format" => {
                params.format = Some(flag_value(args, i)?);
                i += 2;
            }
            "--dry-run" => {
                params.dry_run = true;
                i += 1;
            }
            "--app-root" | "--settings" => {
                common_args.push(args[i].clone());
                common_args.push(flag_value(args, i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    if params.input_folder.is_none() {
        return Err(std::io::Error::other("Missing required --input DIR").into());
    }
    if params.output_folder.is_none() {
        return Err(std::io::Error::other("Missing required --output DIR").into());
    }

    Ok(BatchCropCliArgs {
        common: parse_common_args(common_args.as_slice())?,
        params,
    })
}

fn flag_value(args: &[String], idx: usize) -> Result<String, Box<dyn std::error::Error>> {
    let Some(value) = args.get(idx + 1) else {
        return Err(std::io::Error::other(format!("Missing value for {}", args[idx])).into());
    };
    Ok(value.clone())
}

fn parse_number(flag: &str, value: &str) -> Result<i64, Box<dyn std::error::Error>> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| std::io::Error::other(format!("{flag} expects an integer, got '{value}'")).into())
}

fn run_batch_crop_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_batch_crop_usage();
        return Ok(());
    }

    let parsed = parse_batch_crop_cli_args(args.as_slice())?;
    let settings = load_bridge_settings(
        parsed.common.app_root.as_path(),
        parsed.common.settings.as_deref(),
    )?;
    let service = BatchCropService::new(default_script_executor(&settings), settings.batch.clone());
    let outcome = service.run_params(parsed.params)?;
    println!("{}", serde_json::to_string_pretty(&batch_crop_payload(outcome))?);
    Ok(())
}

fn print_usage() {
    println!(
        "Usage:\n  psmcp-backend-core [serve] [--app-root DIR] [--settings PATH]\n  psmcp-backend-core batch-crop --input DIR --output DIR [options]\n\nRun `psmcp-backend-core batch-crop --help` for batch options."
    );
}

fn print_batch_crop_usage() {
    println!(
        "Usage: psmcp-backend-core batch-crop --input DIR --output DIR [--width N] [--height N] [--count N] [--format png|jpg|tif|psd] [--dry-run] [--app-root DIR] [--settings PATH]"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parse_batch_crop_requires_input_and_output() {
        let err = parse_batch_crop_cli_args(&args(&["--output", "/out"]))
            .expect_err("input is required");
        assert!(err.to_string().contains("--input"));

        let err = parse_batch_crop_cli_args(&args(&["--input", "/in"]))
            .expect_err("output is required");
        assert!(err.to_string().contains("--output"));
    }

    #[test]
    fn parse_batch_crop_accepts_optional_flags() {
        let parsed = parse_batch_crop_cli_args(&args(&[
            "--input",
            "/in",
            "--output",
            "/out",
            "--width",
            "640",
            "--height",
            "480",
            "--count",
            "3",
            "--format",
            "jpg",
            "--dry-run",
            "--settings",
            "config/alt.toml",
        ]))
        .expect("args should parse");

        assert_eq!(
            parsed.params,
            BatchCropParams {
                input_folder: Some(String::from("/in")),
                output_folder: Some(String::from("/out")),
                width: Some(640),
                height: Some(480),
                count: Some(3),
                format: Some(String::from("jpg")),
                dry_run: true,
            }
        );
        assert_eq!(parsed.common.settings.as_deref(), Some("config/alt.toml"));
    }

    #[test]
    fn parse_batch_crop_rejects_bad_numbers_and_unknown_flags() {
        let err = parse_batch_crop_cli_args(&args(&["--input", "/in", "--width", "wide"]))
            .expect_err("non-numeric width rejected");
        assert_eq!(err.to_string(), "--width expects an integer, got 'wide'");

        let err = parse_batch_crop_cli_args(&args(&["--recursive"]))
            .expect_err("unknown flag rejected");
        assert!(err.to_string().starts_with("Unknown argument: --recursive"));

        let err = parse_batch_crop_cli_args(&args(&["--input"]))
            .expect_err("missing value rejected");
        assert_eq!(err.to_string(), "Missing value for --input");
    }

    #[test]
    fn parse_common_args_defaults_to_manifest_root() {
        let common = parse_common_args(&[]).expect("empty args parse");
        assert_eq!(common.app_root, default_app_root_from_manifest_dir());
        assert_eq!(common.settings, None);
    }
}
