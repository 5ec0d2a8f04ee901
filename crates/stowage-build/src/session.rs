use crate::error::{BuildError, BuildResult, Operation};
use std::future::Future;
use std::time::Duration;
use tracing::Instrument;

/// 操作ごとの期限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub build: Duration,
    pub tag: Duration,
    pub push: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            build: Duration::from_secs(300),
            tag: Duration::from_secs(120),
            push: Duration::from_secs(120),
        }
    }
}

impl Deadlines {
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Build => self.build,
            Operation::Tag => self.tag,
            Operation::Push => self.push,
        }
    }
}

/// 1つの操作が持つ期限付きのエンジンセッション
///
/// 期限を過ぎると処理中の future を破棄し、実行中の呼び出しと
/// 保持しているレスポンスを解放する。
pub(crate) struct Session<'a> {
    operation: Operation,
    target: &'a str,
    limit: Duration,
}

impl<'a> Session<'a> {
    pub(crate) fn open(operation: Operation, target: &'a str, deadlines: &Deadlines) -> Self {
        Self {
            operation,
            target,
            limit: deadlines.for_operation(operation),
        }
    }

    pub(crate) async fn run<T, F>(self, work: F) -> BuildResult<T>
    where
        F: Future<Output = BuildResult<T>>,
    {
        let span = tracing::info_span!("session", operation = %self.operation, image = self.target);
        match tokio::time::timeout(self.limit, work).instrument(span).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "{} of {} exceeded {}s",
                    self.operation,
                    self.target,
                    self.limit.as_secs()
                );
                Err(BuildError::Timeout {
                    operation: self.operation,
                    target: self.target.to_string(),
                    limit: self.limit,
                })
            }
        }
    }
}
