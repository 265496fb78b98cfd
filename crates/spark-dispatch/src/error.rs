use std::error::Error as StdError;

use spark_transport::{ErrorCategory, TransportError};
use thiserror::Error;

/// 委托回调的统一返回类型。
pub type HandlerResult = Result<(), DispatchError>;

/// 进入错误漏斗（`handle_error`）的错误。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 漏斗同时接收两类失败：传输层 I/O 错误，以及委托自身的业务错误；
/// - 默认错误处理需要稳定的错误码写入日志，因此两类错误都能给出 `code()`。
///
/// ## 契约（What）
/// - `Transport`：保留 [`TransportError`] 的操作码、分类与 errno；
/// - `Handler`：委托返回的任意错误，错误码固定为 `spark.dispatch.handler_failed`。
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn StdError + Send + Sync>),
}

impl DispatchError {
    pub fn handler(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        DispatchError::Handler(error.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Transport(err) => err.code(),
            DispatchError::Handler(_) => "spark.dispatch.handler_failed",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DispatchError::Transport(err) => err.category(),
            DispatchError::Handler(_) => ErrorCategory::NonRetryable,
        }
    }

    /// 是否属于“对端已断开”类；这类错误走关闭路径而不是错误漏斗。
    pub fn is_disconnect(&self) -> bool {
        matches!(self, DispatchError::Transport(err) if err.is_disconnect())
    }

    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            DispatchError::Transport(err) => Some(err),
            DispatchError::Handler(_) => None,
        }
    }
}
