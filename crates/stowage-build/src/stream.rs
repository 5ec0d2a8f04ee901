//! エンジンの進捗ストリームのデコード
//!
//! エンジンはビルドとプッシュに対して1行1オブジェクトのJSONで応答する:
//!
//! ```text
//! {"stream": "Step 1/3 : FROM alpine\n"}
//! {"error": "manifest unknown", "errorDetail": {"message": "manifest unknown"}}
//! ```
//!
//! 進捗テキストは行が届くたびに [`ProgressSink`] へ渡す。
//! 失敗は最終行だけで通知される。ストリームを読み切った後、最後の行を
//! [`ErrorLine`] として再デコードし、`error` が空でなければ失敗とする。

use crate::error::StreamError;
use futures_util::StreamExt;
use futures_util::io::{AsyncBufRead, AsyncBufReadExt};
use serde::Deserialize;
use std::io::Write;
use std::sync::Mutex;

/// バックエンドが行を保持していない場合の [`StreamError::Decode`] の行表示
pub const UNRETAINED_LINE: &str = "<line not retained by engine>";

/// 進捗行
#[derive(Debug, Default, Deserialize)]
pub struct StreamLine {
    #[serde(default)]
    pub stream: Option<String>,
}

/// 終端のエラー行
#[derive(Debug, Default, Deserialize)]
pub struct ErrorLine {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "errorDetail")]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// 進捗行のテキストを受け取る
pub trait ProgressSink: Send + Sync {
    fn write_progress(&self, text: &str) -> std::io::Result<()>;
}

/// 標準出力に書き出す
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ProgressSink for StdoutSink {
    fn write_progress(&self, text: &str) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }
}

/// 進捗テキストをメモリに溜める
#[derive(Debug, Default)]
pub struct CaptureSink {
    writes: Mutex<Vec<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでの書き込み（順序どおり）
    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn output(&self) -> String {
        self.writes().concat()
    }
}

impl ProgressSink for CaptureSink {
    fn write_progress(&self, text: &str) -> std::io::Result<()> {
        self.writes
            .lock()
            .map_err(|_| std::io::Error::other("capture sink poisoned"))?
            .push(text.to_string());
        Ok(())
    }
}

/// レスポンスストリームをデコードし、進捗を `sink` へ転送
///
/// - 進捗オブジェクトとして不正な行は即座に [`StreamError::Decode`] で失敗。以降は読まない
/// - バックエンドがJSONエラーを読み込みエラーとして返した場合も [`StreamError::Decode`]
/// - 空行は読み飛ばす
/// - 空のストリームは終端チェックなしで成功
/// - 読み込みエラーでループを抜け、最後の完全な行を終端チェックした後に
///   [`StreamError::Read`] を返す
pub async fn decode<R>(reader: R, sink: &dyn ProgressSink) -> Result<(), StreamError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut last_line: Option<String> = None;
    let mut read_fault = None;

    while let Some(next) = lines.next().await {
        let raw = match next {
            Ok(raw) => raw,
            Err(e) => {
                read_fault = Some(into_decode_error(e)?);
                break;
            }
        };

        if raw.trim().is_empty() {
            continue;
        }

        let line: StreamLine = serde_json::from_str(&raw).map_err(|source| StreamError::Decode {
            line: raw.clone(),
            source,
        })?;

        if let Some(text) = line.stream.as_deref() {
            sink.write_progress(text).map_err(StreamError::Sink)?;
        }

        last_line = Some(raw);
    }

    if let Some(raw) = last_line {
        check_terminal(&raw)?;
    }

    match read_fault {
        Some(e) => Err(StreamError::Read(e)),
        None => Ok(()),
    }
}

/// JSON由来の読み込みエラーは `Err(Decode)`、それ以外はそのまま返す
fn into_decode_error(e: std::io::Error) -> Result<std::io::Error, StreamError> {
    let is_json = e
        .get_ref()
        .is_some_and(|inner| inner.is::<serde_json::Error>());
    if !is_json {
        return Ok(e);
    }

    let kind = e.kind();
    match e.into_inner().map(|inner| inner.downcast::<serde_json::Error>()) {
        Some(Ok(source)) => Err(StreamError::Decode {
            line: UNRETAINED_LINE.to_string(),
            source: *source,
        }),
        Some(Err(inner)) => Ok(std::io::Error::new(kind, inner)),
        None => Ok(std::io::Error::from(kind)),
    }
}

/// `raw` をエラー行として再解釈
fn check_terminal(raw: &str) -> Result<(), StreamError> {
    let terminal: ErrorLine = serde_json::from_str(raw).map_err(|source| StreamError::Decode {
        line: raw.to_string(),
        source,
    })?;

    match terminal.error {
        Some(message) if !message.is_empty() => {
            let detail = terminal
                .error_detail
                .and_then(|d| d.message)
                .filter(|m| !m.is_empty());
            tracing::debug!(
                "Container engine reported error: {} (detail: {:?})",
                message,
                detail
            );
            Err(StreamError::Engine { message, detail })
        }
        _ => Ok(()),
    }
}
