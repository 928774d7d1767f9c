//! Draining of a program's output pipes.

use std::fmt;
use std::os::fd::OwnedFd;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Which output of a program a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        })
    }
}

/// What one drain read from its pipe.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Drained {
    pub lines: usize,
    /// The lines themselves, only when capture was requested.
    pub captured: Option<Vec<String>>,
}

/// Start draining the read end of a pipe in the background.
///
/// The task finishes when every write end is closed.
pub fn spawn(fd: OwnedFd, stream: Stream, capture: bool) -> JoinHandle<Drained> {
    let file = tokio::fs::File::from_std(std::fs::File::from(fd));
    tokio::spawn(drain(BufReader::new(file), stream, capture))
}

/// Read `reader` line by line until EOF, logging and counting each line.
///
/// Invalid UTF-8 is replaced rather than dropped. A read error ends the drain
/// with what was read so far.
pub async fn drain<R>(mut reader: R, stream: Stream, capture: bool) -> Drained
where
    R: AsyncBufRead + Unpin,
{
    let mut drained = Drained {
        lines: 0,
        captured: capture.then(Vec::new),
    };
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf);
                info!("{}: {}", stream, line);
                drained.lines += 1;
                if let Some(captured) = drained.captured.as_mut() {
                    captured.push(line.into_owned());
                }
            }
            Err(e) => {
                warn!("reading {} failed: {}", stream, e);
                break;
            }
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_lines_and_keeps_partial_last_line() {
        let input: &[u8] = b"first\r\nsecond\n\nlast";
        let drained = drain(input, Stream::Stdout, true).await;
        assert_eq!(drained.lines, 4);
        assert_eq!(drained.captured.unwrap(), vec!["first", "second", "", "last"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let input: &[u8] = b"ok\n\xff\xfe\n";
        let drained = drain(input, Stream::Stderr, true).await;
        assert_eq!(
            drained.captured.unwrap(),
            vec!["ok".to_string(), "\u{fffd}\u{fffd}".to_string()]
        );
    }

    #[tokio::test]
    async fn pipe_drains_to_eof() {
        use std::io::Write;

        let (read, write) = nix::unistd::pipe().unwrap();
        let task = spawn(read, Stream::Stdout, false);
        let mut writer = std::fs::File::from(write);
        writer.write_all(b"a\nb\n").unwrap();
        drop(writer);
        let drained = task.await.unwrap();
        assert_eq!(drained.lines, 2);
        assert!(drained.captured.is_none());
    }

    #[tokio::test]
    async fn lines_are_only_counted_without_capture() {
        let input = "line\n".repeat(20_000);
        let drained = drain(input.as_bytes(), Stream::Stdout, false).await;
        assert_eq!(drained.lines, 20_000);
        assert_eq!(drained.captured, None);
    }
}
