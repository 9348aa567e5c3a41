mod cli;

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, CompressChoice, EncodeArgs};
use mediasqueeze::commands::{compress, extract, reassemble, reduce};
use mediasqueeze::config::{self, resolve_api_key, Config, TINIFY_KEY_ENV};
use mediasqueeze::exit;
use mediasqueeze::pipeline::{
    FrameCompression, PipelineOptions, PipelineStats, RecordingPipeline,
};
use mediasqueeze_av::{probe_video, EncodeParams, ExtractOptions, FfmpegExtractor, ToolRegistry};
use mediasqueeze_frames::TimelineMode;
use tokio_util::sync::CancellationToken;

fn main() {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive the level from -v
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        format!("mediasqueeze={level},mediasqueeze_av={level},mediasqueeze_frames={level}")
    });

    // stdout carries command payloads, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli) {
        Ok(()) => exit::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit::exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let load_config = || config::load_config_or_default(cli.config.as_deref());

    match cli.command {
        Commands::ReduceJpegSize {
            input,
            output,
            max_size,
            max_iterations,
            overwrite,
        } => {
            let config = load_config()?;
            let args = reduce::ReduceArgs {
                input,
                output,
                max_size_kb: max_size.unwrap_or(config.reduce.max_size_kb),
                max_iterations: max_iterations.unwrap_or(config.reduce.max_iterations),
                overwrite,
            };
            block_on(|cancel| async move {
                reduce::run(&config, &args, cancel).await.map(|_| ())
            })
        }
        Commands::CompressImage {
            input,
            output,
            api_key,
            metadata,
            overwrite,
            disable_hard_limit,
        } => {
            let config = load_config()?;
            let args = compress::CompressArgs {
                input,
                output,
                api_key,
                metadata: metadata.unwrap_or(config.remote.metadata),
                overwrite,
                disable_hard_limit,
            };
            block_on(|cancel| async move {
                compress::run(&config, &args, cancel).await.map(|_| ())
            })
        }
        Commands::ExtractUniqueFrames {
            input,
            output_dir,
            stride,
            crop,
            mpdecimate,
            format,
            layout,
            overwrite,
        } => {
            let config = load_config()?;
            let args = extract::ExtractArgs {
                input,
                output_dir,
                options: ExtractOptions {
                    stride: stride.unwrap_or(config.extract.stride),
                    crop,
                    mpdecimate: mpdecimate || config.extract.mpdecimate,
                    format: format.unwrap_or(config.extract.format),
                },
                layout: layout.unwrap_or(config.extract.layout),
                overwrite,
            };
            block_on(|cancel| async move {
                extract::run(&config, &args, cancel).await.map(|_| ())
            })
        }
        Commands::ReassembleVideo {
            frames_dir,
            output,
            audio,
            encode,
            overwrite,
        } => {
            let config = load_config()?;
            let (params, mode) = encode_settings(&config, &encode)?;
            let args = reassemble::ReassembleArgs {
                frames_dir,
                output,
                audio,
                encode: params,
                mode,
                link_strategy: encode.link.unwrap_or(config.reassemble.link_strategy),
                overwrite,
            };
            block_on(|cancel| async move {
                reassemble::run(&config, &args, cancel).await.map(|_| ())
            })
        }
        Commands::OptimizeRecording {
            input,
            output,
            audio,
            stride,
            crop,
            mpdecimate,
            format,
            compress,
            frame_max_size,
            api_key,
            encode,
            stats_json,
            overwrite,
        } => {
            // Setup failures are recorded too.
            let started = Instant::now();
            let mut stats = PipelineStats::new(input.clone(), output.clone());
            let result = (|| -> Result<()> {
                let config = load_config()?;
                let (params, mode) = encode_settings(&config, &encode)?;
                let compression = match compress {
                    CompressChoice::None => FrameCompression::None,
                    CompressChoice::Jpegoptim => FrameCompression::Jpegoptim {
                        target_bytes: frame_max_size.unwrap_or(config.reduce.max_size_kb) * 1024,
                        max_iterations: config.reduce.max_iterations,
                    },
                    CompressChoice::Tinify => FrameCompression::Tinify {
                        api_key: resolve_api_key(api_key.as_deref(), &config.remote).ok_or_else(
                            || {
                                anyhow::anyhow!(
                                    "--compress tinify needs --api-key or {}",
                                    TINIFY_KEY_ENV
                                )
                            },
                        )?,
                        base_url: config.remote.base_url.clone(),
                    },
                };
                let opts = PipelineOptions {
                    input,
                    output,
                    audio,
                    extract: ExtractOptions {
                        stride: stride.unwrap_or(config.extract.stride),
                        crop,
                        mpdecimate: mpdecimate || config.extract.mpdecimate,
                        format: format.unwrap_or(config.extract.format),
                    },
                    mode,
                    link_strategy: encode.link.unwrap_or(config.reassemble.link_strategy),
                    encode: params,
                    compression,
                    overwrite,
                };
                let stats = &mut stats;
                block_on(|cancel| async move {
                    optimize_recording(&config, &opts, stats, cancel).await
                })
            })();
            stats.finish(&result, started.elapsed());
            stats.emit(stats_json);
            result
        }
        Commands::Probe { file, json } => {
            let config = load_config()?;
            block_on(|cancel| async move { probe_file(&config, &file, json, cancel).await })
        }
        Commands::CheckTools => {
            let config = load_config()?;
            block_on(|_| async move { check_tools(&config).await })
        }
        Commands::Validate { path } => {
            let path = path.or(cli.config.clone());
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediasqueeze {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Run a future on a fresh runtime with Ctrl-C wired to a cancellation token.
fn block_on<F, Fut>(f: F) -> Result<()>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping");
                watcher.cancel();
            }
        });
        f(cancel).await
    })
}

fn encode_settings(config: &Config, encode: &EncodeArgs) -> Result<(EncodeParams, TimelineMode)> {
    let defaults = &config.reassemble.encode;
    let params = EncodeParams {
        codec: encode.codec.clone().unwrap_or_else(|| defaults.codec.clone()),
        crf: encode.crf.unwrap_or(defaults.crf),
        preset: encode.preset.clone().unwrap_or_else(|| defaults.preset.clone()),
        pix_fmt: defaults.pix_fmt.clone(),
        audio_codec: encode.audio_codec.clone().or_else(|| defaults.audio_codec.clone()),
        audio_bitrate: encode
            .audio_bitrate
            .clone()
            .or_else(|| defaults.audio_bitrate.clone()),
    };
    let mode = config.reassemble.timeline_mode(encode.mode, encode.fps);
    if let TimelineMode::Cfr { fps } = mode {
        if !(fps.is_finite() && fps > 0.0) {
            anyhow::bail!("--fps must be a positive number, got {}", fps);
        }
    }
    Ok((params, mode))
}

async fn optimize_recording(
    config: &Config,
    opts: &PipelineOptions,
    stats: &mut PipelineStats,
    cancel: CancellationToken,
) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let extractor = FfmpegExtractor::new(&tools, cancel.clone())?;
    RecordingPipeline::new(&tools, &extractor, cancel.clone())
        .run(opts, stats)
        .await?;
    Ok(())
}

async fn probe_file(config: &Config, file: &Path, json: bool, cancel: CancellationToken) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let info = probe_video(&tools, file, &cancel)
        .await
        .with_context(|| format!("Failed to probe {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File: {}", file.display());
        println!("Video: {}x{}", info.width, info.height);
        println!("Frame rate: {:.3} fps", info.fps);
        println!("Duration: {:.2}s", info.duration);
        println!("Frames: {}", info.frame_count);
        println!("Audio: {}", if info.has_audio { "yes" } else { "no" });
    }
    Ok(())
}

async fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all().await {
        let status = if tool.available && tool.supported {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        if tool.available && !tool.supported {
            if let Some(ref required) = tool.required {
                print!(" [unsupported, requires {}]", required);
            }
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Tool timeout: {}s", config.tools.timeout_secs);
    println!(
        "  Reduce: {} KB target, {} iterations",
        config.reduce.max_size_kb, config.reduce.max_iterations
    );
    println!(
        "  Remote: {} (API key {})",
        config.remote.base_url,
        if config.remote.api_key.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!(
        "  Extract: stride {}, {}, {}",
        config.extract.stride, config.extract.format, config.extract.layout
    );
    println!(
        "  Reassemble: {} (crf {}, {})",
        config.reassemble.timeline_mode(None, None),
        config.reassemble.encode.crf,
        config.reassemble.encode.preset
    );

    Ok(())
}
