//! 情感标注步骤
//!
//! 分类器是进程启动时加载一次的只读外部服务。标注在阻塞线程池上调用它，
//! 并受超时约束；任何失败都降级为 `SentimentCode::Unknown`。

use std::sync::Arc;
use std::time::Duration;

use domain::SentimentCode;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
    #[error("classifier failed: {0}")]
    Failure(String),
}

impl ClassifierError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }
}

/// 同步的情感分类器接口
pub trait SentimentClassifier: Send + Sync + 'static {
    fn classify(&self, text: &str) -> Result<SentimentCode, ClassifierError>;
}

#[derive(Clone)]
pub struct SentimentAnnotator {
    classifier: Arc<dyn SentimentClassifier>,
    timeout: Duration,
}

impl SentimentAnnotator {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 返回情感代码，从不失败。超时后阻塞任务继续运行，结果被丢弃。
    pub async fn annotate(&self, text: &str) -> SentimentCode {
        match self.try_annotate(text).await {
            Ok(code) => code,
            Err(err) => {
                warn!(error = %err, "sentiment annotation degraded to fallback");
                SentimentCode::Unknown
            }
        }
    }

    async fn try_annotate(&self, text: &str) -> Result<SentimentCode, ClassifierError> {
        let classifier = self.classifier.clone();
        let text = text.to_owned();
        let task = tokio::task::spawn_blocking(move || classifier.classify(&text));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ClassifierError::failure(join_err.to_string())),
            Err(_) => Err(ClassifierError::Timeout(self.timeout)),
        }
    }
}
