//! # Encoder Module
//!
//! Questo modulo invoca l'encoder esterno su un singolo file.
//!
//! ## Contratto:
//! - L'encoder riceve il path del file come ultimo argomento
//! - In caso di successo scrive `<base>.new.<ext>` accanto all'input ed esce con 0
//! - Qualsiasi altro exit status è un fallimento; non si assume alcun output
//!
//! ## Cattura output:
//! - stdout e stderr vengono letti in streaming dentro `OutputCapture`
//! - I buffer sono azzerati a ogni invocazione e leggibili dalla pagina di stato
//! - Nessun timeout e nessun retry: il tentativo dura quanto il processo
//!
//! Il trait `Encoder` separa il driver dal meccanismo di spawn, così i test
//! possono usare un encoder finto.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::MinifyError;
use crate::pipeline::progress_tracker::{OutputCapture, OutputStream};

/// Output of a successful encoder run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Converts one file, writing its sibling `.new` output
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run the conversion of `path` to completion.
    async fn run(&self, path: &Path) -> Result<EncodeOutput, MinifyError>;
}

/// Encoder backed by an external program
pub struct CommandEncoder {
    program: String,
    args: Vec<String>,
    capture: OutputCapture,
}

impl CommandEncoder {
    pub fn new(program: impl Into<String>, args: Vec<String>, capture: OutputCapture) -> Self {
        Self {
            program: program.into(),
            args,
            capture,
        }
    }

    pub fn from_config(config: &Config, capture: OutputCapture) -> Self {
        Self::new(config.encoder_program.clone(), config.encoder_args.clone(), capture)
    }
}

#[async_trait]
impl Encoder for CommandEncoder {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self, path: &Path) -> Result<EncodeOutput, MinifyError> {
        self.capture.reset();
        debug!("Spawning {} {:?} {}", self.program, self.args, path.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MinifyError::EncoderSpawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let start_time = std::time::Instant::now();

        let (_, _, status) = futures::try_join!(
            pump(stdout, OutputStream::Stdout, &self.capture),
            pump(stderr, OutputStream::Stderr, &self.capture),
            child.wait(),
        )?;

        info!(
            "File conversion done({}) with exit {:?} in {:.1}s",
            path.display(),
            status.code(),
            start_time.elapsed().as_secs_f64()
        );

        let (stdout, stderr) = self.capture.snapshot();
        if status.success() {
            Ok(EncodeOutput { stdout, stderr })
        } else {
            Err(MinifyError::EncoderExit {
                path: path.to_path_buf(),
                code: status.code(),
                stdout,
                stderr,
            })
        }
    }
}

/// Copy a child pipe into the capture buffer until EOF
async fn pump<R>(reader: Option<R>, stream: OutputStream, capture: &OutputCapture) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };

    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        capture.append(stream, &String::from_utf8_lossy(&buf[..n]));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str, capture: OutputCapture) -> CommandEncoder {
        CommandEncoder::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            capture,
        )
    }

    #[tokio::test]
    async fn test_success_captures_streams() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("clip.mp4");
        std::fs::write(&input, "original").unwrap();

        let capture = OutputCapture::new();
        let encoder = sh(
            r#"echo "encoding $1"; echo "progress" >&2; printf converted > "${1%.*}.new.mp4""#,
            capture.clone(),
        );

        let output = encoder.run(&input).await.unwrap();
        assert!(output.stdout.contains("encoding"));
        assert!(output.stdout.contains("clip.mp4"));
        assert_eq!(output.stderr, "progress\n");
        assert_eq!(
            std::fs::read_to_string(temp.path().join("clip.new.mp4")).unwrap(),
            "converted"
        );
        assert_eq!(capture.snapshot(), (output.stdout.clone(), output.stderr.clone()));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("bad.mp4");
        std::fs::write(&input, "original").unwrap();

        let encoder = sh("echo nope >&2; exit 2", OutputCapture::new());
        match encoder.run(&input).await.unwrap_err() {
            MinifyError::EncoderExit { code, stderr, path, .. } => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "nope\n");
                assert_eq!(path, input);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_buffers_reset_between_runs() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("a.mp4");
        std::fs::write(&input, "x").unwrap();

        let capture = OutputCapture::new();
        capture.append(OutputStream::Stdout, "stale output");
        let encoder = sh("echo fresh", capture.clone());
        encoder.run(&input).await.unwrap();
        assert_eq!(capture.snapshot().0, "fresh\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let encoder = CommandEncoder::new(
            "/definitely/not/an/encoder",
            Vec::new(),
            OutputCapture::new(),
        );
        let err = encoder.run(Path::new("x.mp4")).await.unwrap_err();
        assert!(matches!(err, MinifyError::EncoderSpawn { .. }));
    }
}
