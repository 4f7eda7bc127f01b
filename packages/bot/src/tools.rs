//! Wrappers around the yt-dlp, ffmpeg and ffprobe binaries.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use actors::{BoxError, CallFuture, Fetched, Fetcher, MediaInfo, Prober, Remuxer};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

const YT_DLP: &str = "yt-dlp";
const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// Best mp4 available, merged with audio, with plain fallbacks.
const FORMAT_CHAIN: &str = "bv*[height>=1080][ext=mp4]+ba[ext=m4a]/bv*[ext=mp4]+ba/best[ext=mp4]/best";

const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 12; OnePlus 6T) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120 Mobile Safari/537.36";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} binary not found in PATH")]
    BinaryNotFound { tool: &'static str },
    #[error("{tool} failed (exit_code={exit_code:?}): {stderr}")]
    ProcessFailed {
        tool: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{tool} did not report an output file")]
    MissingOutput { tool: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Run a tool to completion and return its stdout.
async fn run_tool<I, S>(tool: &'static str, args: I) -> Result<String, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(tool)
        .args(args)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::BinaryNotFound { tool },
            _ => ToolError::Io(e),
        })?;

    if !output.status.success() {
        return Err(ToolError::ProcessFailed {
            tool,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Downloads with yt-dlp into the work directory.
#[derive(Debug, Clone, Default)]
pub struct YtDlpFetcher;

impl YtDlpFetcher {
    async fn download(&self, url: &str, work_dir: &Path) -> Result<Fetched, ToolError> {
        tokio::fs::create_dir_all(work_dir).await?;

        let home = format!("home:{}", work_dir.display());
        let temp = format!("temp:{}", work_dir.display());
        let stdout = run_tool(
            YT_DLP,
            [
                "--quiet",
                "--no-progress",
                "--no-simulate",
                "--print",
                "after_move:filepath",
                "-P",
                home.as_str(),
                "-P",
                temp.as_str(),
                "-o",
                "%(id)s.%(ext)s",
                "-f",
                FORMAT_CHAIN,
                "--merge-output-format",
                "mp4",
                "--retries",
                "2",
                "--user-agent",
                USER_AGENT,
                url,
            ],
        )
        .await?;

        let path = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or(ToolError::MissingOutput { tool: YT_DLP })?;
        let size = tokio::fs::metadata(&path).await?.len();

        tracing::debug!(url, path = %path.display(), size, "Downloaded");
        Ok(Fetched { path, size })
    }
}

impl Fetcher for YtDlpFetcher {
    fn fetch<'a>(&'a self, url: &'a str, work_dir: &'a Path) -> CallFuture<'a, Fetched> {
        async move { self.download(url, work_dir).await.map_err(BoxError::from) }.boxed()
    }
}

/// Moves the moov atom to the front with a stream copy.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRemuxer;

impl FfmpegRemuxer {
    async fn faststart(&self, input: &Path) -> Result<PathBuf, ToolError> {
        let mut output = input.as_os_str().to_owned();
        output.push(".faststart.mp4");
        let output = PathBuf::from(output);

        run_tool(
            FFMPEG,
            [
                OsStr::new("-y"),
                OsStr::new("-i"),
                input.as_os_str(),
                OsStr::new("-c"),
                OsStr::new("copy"),
                OsStr::new("-movflags"),
                OsStr::new("+faststart"),
                output.as_os_str(),
            ],
        )
        .await?;

        match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => Ok(output),
            _ => Err(ToolError::MissingOutput { tool: FFMPEG }),
        }
    }
}

impl Remuxer for FfmpegRemuxer {
    fn remux<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, PathBuf> {
        async move {
            match self.faststart(path).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Remux failed, sending original: {}", e);
                    path.to_path_buf()
                }
            }
        }
        .boxed()
    }
}

/// Reads dimensions, duration and rotation with ffprobe.
#[derive(Debug, Clone, Default)]
pub struct FfprobeProber;

impl FfprobeProber {
    async fn probe_json(&self, path: &Path) -> Result<MediaInfo, ToolError> {
        let stdout = run_tool(
            FFPROBE,
            [
                OsStr::new("-v"),
                OsStr::new("error"),
                OsStr::new("-select_streams"),
                OsStr::new("v:0"),
                OsStr::new("-show_entries"),
                OsStr::new("stream=width,height:stream_tags=rotate:stream_side_data=rotation"),
                OsStr::new("-show_entries"),
                OsStr::new("format=duration"),
                OsStr::new("-of"),
                OsStr::new("json"),
                path.as_os_str(),
            ],
        )
        .await?;

        parse_probe(&stdout)
    }
}

impl Prober for FfprobeProber {
    fn probe<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, MediaInfo> {
        async move {
            self.probe_json(path).await.unwrap_or_else(|e| {
                tracing::debug!(path = %path.display(), "Probe failed: {}", e);
                MediaInfo::default()
            })
        }
        .boxed()
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Rotation in degrees, folded into 0..360 and kept only on quarter turns.
fn normalize_rotation(degrees: i64) -> Option<u16> {
    match degrees.rem_euclid(360) {
        r @ (0 | 90 | 180 | 270) => Some(r as u16),
        _ => None,
    }
}

/// Extract [`MediaInfo`] from `ffprobe -of json` output.
pub fn parse_probe(json: &str) -> Result<MediaInfo, ToolError> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let mut info = MediaInfo::default();

    if let Some(stream) = output.streams.first() {
        info.width = stream.width.filter(|w| *w > 0);
        info.height = stream.height.filter(|h| *h > 0);

        let tagged = stream
            .tags
            .as_ref()
            .and_then(|t| t.rotate.as_deref())
            .and_then(|r| r.trim().parse::<i64>().ok());
        let side_data = stream.side_data_list.iter().find_map(|s| s.rotation);
        info.rotation = tagged.or(side_data).and_then(normalize_rotation);
    }

    info.duration_secs = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d as u32);

    Ok(info)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn parses_dimensions_duration_and_rotate_tag() -> Result<(), ToolError> {
        let json = r#"{
            "programs": [],
            "streams": [{ "width": 1080, "height": 1920, "tags": { "rotate": "90" } }],
            "format": { "duration": "12.480000" }
        }"#;

        let info = parse_probe(json)?;
        assert_eq!(info.width, Some(1080));
        assert_eq!(info.height, Some(1920));
        assert_eq!(info.duration_secs, Some(12));
        assert_eq!(info.rotation, Some(90));
        Ok(())
    }

    #[test]
    fn side_data_rotation_is_normalized() -> Result<(), ToolError> {
        let json = r#"{
            "streams": [{ "width": 720, "height": 1280, "side_data_list": [{ "rotation": -90 }] }],
            "format": {}
        }"#;

        let info = parse_probe(json)?;
        assert_eq!(info.rotation, Some(270));
        assert_eq!(info.duration_secs, None);
        Ok(())
    }

    #[test]
    fn missing_fields_stay_empty() -> Result<(), ToolError> {
        let info = parse_probe(r#"{ "streams": [{ "width": 0, "tags": { "rotate": "45" } }] }"#)?;
        assert_eq!(info, MediaInfo::default());

        assert_eq!(parse_probe("{}")?, MediaInfo::default());
        assert!(parse_probe("not json").is_err());
        Ok(())
    }

    #[test]
    fn rotation_folds_into_quarter_turns() {
        assert_eq!(normalize_rotation(0), Some(0));
        assert_eq!(normalize_rotation(450), Some(90));
        assert_eq!(normalize_rotation(-180), Some(180));
        assert_eq!(normalize_rotation(30), None);
    }
}
