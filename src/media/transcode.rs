//! Concrete `Transcoder`: probes a stored clip's video codec with
//! `ffprobe` and, if it isn't H.264, re-encodes to a browser-friendly mp4
//! with `ffmpeg`. Shells out with `tokio::process::Command` rather than
//! the blocking `std::process::Command` the recording finalizer uses,
//! since this runs on the media GET handler's async path, where awaiting
//! the transcoder subprocess is fine and not a hot loop.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::traits::Transcoder;

pub struct FfmpegTranscoder;

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_codec(&self, path: &Path) -> anyhow::Result<String> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_name",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn to_web_mp4(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let stem = path
            .file_stem()
            .ok_or_else(|| anyhow::anyhow!("path has no file stem: {}", path.display()))?
            .to_string_lossy();
        let output_path = path.with_file_name(format!("{}_web.mp4", stem));

        let status = Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(path)
            .args([
                "-c:v", "libx264", "-c:a", "aac", "-movflags", "+faststart",
            ])
            .arg(&output_path)
            .status()
            .await?;
        if !status.success() {
            anyhow::bail!("ffmpeg transcode exited with {}", status);
        }
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_mp4_output_path_appends_suffix() {
        let path = PathBuf::from("/data/videos/cam1/clip.mkv");
        let stem = path.file_stem().unwrap().to_string_lossy();
        let output = path.with_file_name(format!("{}_web.mp4", stem));
        assert_eq!(output, PathBuf::from("/data/videos/cam1/clip_web.mp4"));
    }
}
