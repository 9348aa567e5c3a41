//! `compress-image`: compress an image through the Tinify API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use mediasqueeze_av::actions::DEFAULT_EXCLUDED_TAGS;
use mediasqueeze_av::{copy_metadata, RemoteCompressor, TinifyClient, ToolRegistry, Workspace};
use tokio_util::sync::CancellationToken;

use super::{ensure_writable, read_input, staging_name, write_output};
use crate::config::{resolve_api_key, Config, MetadataMode, TINIFY_KEY_ENV};
use crate::exit::Interrupted;

#[derive(Debug, Clone)]
pub struct CompressArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub api_key: Option<String>,
    pub metadata: MetadataMode,
    pub overwrite: bool,
    pub disable_hard_limit: bool,
}

/// What a compression run achieved.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressSummary {
    pub input_size: u64,
    pub output_size: u64,
    pub compression_count: Option<u64>,
}

impl CompressSummary {
    /// Output size relative to the input, in percent.
    pub fn ratio(&self) -> f64 {
        if self.input_size == 0 {
            return 0.0;
        }
        self.output_size as f64 / self.input_size as f64 * 100.0
    }
}

pub async fn run(config: &Config, args: &CompressArgs, cancel: CancellationToken) -> Result<CompressSummary> {
    if let Some(output) = &args.output {
        ensure_writable(output, args.overwrite)?;
    }

    let api_key = resolve_api_key(args.api_key.as_deref(), &config.remote).ok_or_else(|| {
        anyhow::anyhow!(
            "No Tinify API key: pass --api-key, set {} or remote.api_key in the config",
            TINIFY_KEY_ENV
        )
    })?;

    let tools = ToolRegistry::discover(&config.tools);
    if args.metadata == MetadataMode::Keep {
        tools
            .verify_version("exiftool")
            .await
            .context("exiftool is required to keep metadata (use --metadata strip to skip it)")?;
    }

    let client = TinifyClient::with_base_url(api_key, config.remote.base_url.as_str());
    compress_with(&client, &tools, args, config.remote.hard_limit_bytes, cancel).await
}

/// Compress with an explicit client.
pub async fn compress_with(
    client: &dyn RemoteCompressor,
    tools: &ToolRegistry,
    args: &CompressArgs,
    hard_limit_bytes: u64,
    cancel: CancellationToken,
) -> Result<CompressSummary> {
    if let Some(output) = &args.output {
        ensure_writable(output, args.overwrite)?;
    }

    let original = read_input(args.input.as_deref()).await?;
    let input_size = original.len() as u64;
    if !args.disable_hard_limit && input_size > hard_limit_bytes {
        anyhow::bail!(
            "Input is {} bytes, above the {} byte limit (use --disable-hard-limit to send it anyway)",
            input_size,
            hard_limit_bytes
        );
    }

    let workspace = Workspace::new(staging_name(args.input.as_deref(), args.output.as_deref()))?;

    // exiftool needs the original on disk.
    let original_path = match (&args.input, args.metadata) {
        (Some(path), MetadataMode::Keep) => Some(path.clone()),
        (None, MetadataMode::Keep) => {
            let path = workspace.temp_file("original");
            tokio::fs::write(&path, &original).await?;
            Some(path)
        }
        (_, MetadataMode::Strip) => None,
    };

    let compressed = tokio::select! {
        _ = cancel.cancelled() => return Err(Interrupted.into()),
        result = client.compress(original) => result.context("Remote compression failed")?,
    };
    if cancel.is_cancelled() {
        return Err(Interrupted.into());
    }
    tokio::fs::write(workspace.output(), &compressed.bytes).await?;

    if let Some(original_path) = original_path {
        copy_metadata(
            tools,
            &original_path,
            &workspace.output(),
            DEFAULT_EXCLUDED_TAGS,
            &cancel,
        )
        .await
        .context("Failed to copy metadata to the compressed image")?;
    }

    let output_size = tokio::fs::metadata(workspace.output()).await?.len();
    if cancel.is_cancelled() {
        return Err(Interrupted.into());
    }
    write_output(workspace, args.output.as_deref()).await?;

    let summary = CompressSummary {
        input_size,
        output_size,
        compression_count: compressed.compression_count,
    };
    eprintln!(
        "Compressed: {} → {} bytes ({:.1}% of original)",
        summary.input_size,
        summary.output_size,
        summary.ratio()
    );
    if let Some(count) = summary.compression_count {
        eprintln!("Compressions this month: {}", count);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::{exit_code, INTERRUPTED, QUOTA_EXCEEDED};
    use async_trait::async_trait;
    use mediasqueeze_av::CompressedImage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn strip_args(input: PathBuf, output: PathBuf) -> CompressArgs {
        CompressArgs {
            input: Some(input),
            output: Some(output),
            api_key: Some("key".into()),
            metadata: MetadataMode::Strip,
            overwrite: false,
            disable_hard_limit: false,
        }
    }

    async fn tinify(server: &MockServer, result: &[u8]) {
        Mock::given(method("POST"))
            .and(path("/shrink"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}/output/1", server.uri()).as_str())
                    .insert_header("Compression-Count", "7"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/output/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(result.to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn writes_compressed_image() {
        let server = MockServer::start().await;
        tinify(&server, b"tiny").await;
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("photo.tiny.jpg");
        std::fs::write(&input, b"a much larger image").unwrap();

        let client = TinifyClient::with_base_url("key", server.uri());
        let tools = ToolRegistry::from_tools(Vec::new());
        let summary = compress_with(
            &client,
            &tools,
            &strip_args(input, output.clone()),
            1024,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"tiny");
        assert_eq!(summary.input_size, 19);
        assert_eq!(summary.output_size, 4);
        assert_eq!(summary.compression_count, Some(7));
    }

    #[tokio::test]
    async fn oversized_input_is_not_uploaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("huge.jpg");
        std::fs::write(&input, vec![0u8; 2048]).unwrap();

        let client = TinifyClient::with_base_url("key", server.uri());
        let tools = ToolRegistry::from_tools(Vec::new());
        let err = compress_with(
            &client,
            &tools,
            &strip_args(input, dir.path().join("out.jpg")),
            1024,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("--disable-hard-limit"));
    }

    #[tokio::test]
    async fn quota_error_keeps_its_exit_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"error":"TooManyRequests","message":"Your monthly limit has been exceeded"}"#,
            ))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("out.jpg");
        std::fs::write(&input, b"image").unwrap();

        let client = TinifyClient::with_base_url("key", server.uri());
        let tools = ToolRegistry::from_tools(Vec::new());
        let err = compress_with(
            &client,
            &tools,
            &strip_args(input, output.clone()),
            1024,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(exit_code(&err), QUOTA_EXCEEDED);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn keeping_metadata_needs_exiftool() {
        let server = MockServer::start().await;
        tinify(&server, b"tiny").await;
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("out.jpg");
        std::fs::write(&input, b"a much larger image").unwrap();

        let client = TinifyClient::with_base_url("key", server.uri());
        let tools = ToolRegistry::from_tools(Vec::new());
        let args = CompressArgs {
            metadata: MetadataMode::Keep,
            ..strip_args(input, output.clone())
        };
        let err = compress_with(&client, &tools, &args, 1024, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("exiftool"));
        assert!(!output.exists());
    }

    /// Trips the token while the upload is in flight, then answers anyway.
    struct CancelledMidUpload {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl RemoteCompressor for CancelledMidUpload {
        async fn compress(&self, _image: Vec<u8>) -> mediasqueeze_av::Result<CompressedImage> {
            self.cancel.cancel();
            Ok(CompressedImage {
                bytes: b"tiny".to_vec(),
                compression_count: Some(1),
            })
        }
    }

    #[tokio::test]
    async fn interrupt_during_upload_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("out.jpg");
        std::fs::write(&input, b"a much larger image").unwrap();

        let cancel = CancellationToken::new();
        let client = CancelledMidUpload {
            cancel: cancel.clone(),
        };
        let tools = ToolRegistry::from_tools(Vec::new());
        let err = compress_with(&client, &tools, &strip_args(input, output.clone()), 1024, cancel)
            .await
            .unwrap_err();

        assert_eq!(exit_code(&err), INTERRUPTED);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn cancel_races_a_slow_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_delay(std::time::Duration::from_secs(30)))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("out.jpg");
        std::fs::write(&input, b"image").unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let client = TinifyClient::with_base_url("key", server.uri());
        let tools = ToolRegistry::from_tools(Vec::new());
        let err = compress_with(&client, &tools, &strip_args(input, output.clone()), 1024, cancel)
            .await
            .unwrap_err();

        assert_eq!(exit_code(&err), INTERRUPTED);
        assert!(!output.exists());
    }
}
