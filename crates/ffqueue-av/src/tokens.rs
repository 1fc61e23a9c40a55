//! Whitespace tokenizer over a child process's diagnostic stream.
//!
//! ffmpeg redraws its status line with carriage returns, so splitting on lines
//! would starve the reader until the process exits. Splitting on any ASCII
//! whitespace yields `frame=`, `fps,` and friends as soon as they are printed.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Reads maximal runs of non-whitespace bytes from an async reader.
#[derive(Debug)]
pub struct TokenReader<R> {
    inner: BufReader<R>,
    partial: Vec<u8>,
}

impl<R: AsyncRead + Unpin> TokenReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            partial: Vec::new(),
        }
    }

    /// Read the next token, or `None` once the stream is closed.
    ///
    /// Invalid UTF-8 is replaced lossily. A token interrupted by a cancelled
    /// read is kept and completed by the next call.
    pub async fn next_token(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                if self.partial.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_partial()));
            }

            let mut consumed = 0;
            let mut complete = false;
            for &byte in buf {
                consumed += 1;
                if byte.is_ascii_whitespace() {
                    if !self.partial.is_empty() {
                        complete = true;
                        break;
                    }
                } else {
                    self.partial.push(byte);
                }
            }
            self.inner.consume(consumed);

            if complete {
                return Ok(Some(self.take_partial()));
            }
        }
    }

    fn take_partial(&mut self) -> String {
        let token = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &[u8]) -> Vec<String> {
        let mut reader = TokenReader::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = reader.next_token().await.unwrap() {
            tokens.push(token);
        }
        tokens
    }

    #[tokio::test]
    async fn test_splits_on_any_whitespace() {
        let tokens = collect(b"  Input #0,\tmov\n  Duration: 00:01:00.00,\r\n").await;
        assert_eq!(
            tokens,
            ["Input", "#0,", "mov", "Duration:", "00:01:00.00,"]
        );
    }

    #[tokio::test]
    async fn test_carriage_return_separates_status_updates() {
        let tokens = collect(b"frame=  25 fps=0.0\rframe=  50 fps=25\r").await;
        assert_eq!(
            tokens,
            ["frame=", "25", "fps=0.0", "frame=", "50", "fps=25"]
        );
    }

    #[tokio::test]
    async fn test_trailing_token_without_whitespace() {
        assert_eq!(collect(b"frame=1500").await, ["frame=1500"]);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        assert!(collect(b"").await.is_empty());
        assert!(collect(b" \n\r\t ").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_lossy() {
        let tokens = collect(b"ok \xff\xfe done").await;
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], "ok");
        assert_eq!(tokens[2], "done");
    }
}
