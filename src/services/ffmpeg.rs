use std::{path::Path, process::Stdio};

use anyhow::Context;
use tokio::process::Command;

/// Media probe and trim operations backed by the ffmpeg binaries.
#[derive(Clone)]
pub struct Ffmpeg {
    ffmpeg_path: String,
    ffprobe_path: String,
}

#[derive(serde::Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl Ffmpeg {
    pub fn new(ffmpeg_path: String, ffprobe_path: String) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
        }
    }

    /// Get a container's duration in seconds.
    #[tracing::instrument(skip(self))]
    pub async fn duration(&self, input: &Path) -> anyhow::Result<f64> {
        let output = Command::new(&self.ffprobe_path)
            .arg("-v")
            .arg("error")
            .arg("-show_format")
            .arg("-of")
            .arg("json")
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("unable to run ffprobe")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe exited with {}: {}", output.status, stderr);
        }

        parse_duration(&output.stdout)
    }

    /// Re-encode everything after `start` seconds into a new file.
    #[tracing::instrument(skip(self))]
    pub async fn trim_start(
        &self,
        input: &Path,
        output_path: &Path,
        start: f64,
    ) -> anyhow::Result<()> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-ss")
            .arg(start.to_string())
            .arg("-c:v")
            .arg("libx264")
            .arg("-c:a")
            .arg("aac")
            .arg("-movflags")
            .arg("+faststart")
            .arg(output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("unable to run ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg exited with {}: {}", output.status, stderr);
        }

        tracing::trace!("finished ffmpeg run");

        Ok(())
    }
}

fn parse_duration(data: &[u8]) -> anyhow::Result<f64> {
    let probe: ProbeOutput =
        serde_json::from_slice(data).context("unable to parse ffprobe output")?;

    probe
        .format
        .and_then(|format| format.duration)
        .and_then(|duration| duration.parse::<f64>().ok())
        .context("ffprobe output missing duration")
}

#[cfg(test)]
mod tests {
    use super::parse_duration;

    #[test]
    fn test_parse_duration() {
        let data = br#"{"format": {"filename": "in.mp4", "duration": "30.034000"}}"#;
        let duration = parse_duration(data).unwrap();
        assert!((duration - 30.034).abs() < f64::EPSILON);

        let data = br#"{"format": {"filename": "in.mp4"}}"#;
        assert!(
            parse_duration(data).is_err(),
            "output without a duration should be an error"
        );

        let data = br#"{}"#;
        assert!(parse_duration(data).is_err());

        assert!(
            parse_duration(b"not json").is_err(),
            "garbage output should be an error"
        );
    }
}
