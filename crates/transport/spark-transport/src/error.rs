use std::fmt;
use std::io;

use thiserror::Error;

/// 描述一次底层操作对应的稳定错误码与默认文案。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 日志与告警按 `code` 聚合，文案允许调整但错误码必须稳定；
/// - 各实现 crate（tcp/tls/测试桩）声明自己的常量，契约层只规定结构。
///
/// ## 契约（What）
/// - `code`：形如 `spark.transport.tcp.read_failed` 的点分字符串；
/// - `message`：简短操作名，会作为 `Display` 前缀输出。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

impl OperationKind {
    pub const fn new(code: &'static str, message: &'static str) -> Self {
        Self { code, message }
    }
}

/// 错误分类，驱动分发器选择“忽略 / 关闭 / 错误漏斗”三种处理路径。
///
/// - `Retryable`：`WouldBlock`/`Interrupted`，等待下一次就绪事件；
/// - `Disconnected`：对端已断开（reset、未连接、已关闭、中止、管道破裂、坏描述符），转为关闭事件；
/// - `Timeout`：阻塞阶段（如握手）超时；
/// - `Security`：握手或证书校验失败；
/// - `NonRetryable`：其余确定性失败，进入错误漏斗。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Retryable,
    Disconnected,
    Timeout,
    Security,
    NonRetryable,
}

/// 传输层统一错误：操作码 + 分类 + 原始 `io::Error`。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 上层需要同时拿到稳定错误码（日志）、分类（策略）与原始 errno（非阻塞 connect 判定），
///   因此不在此处擦除 `io::Error`；
/// - TLS 层把 rustls 错误包装成 `InvalidData` 的 `io::Error`，并显式标记为 `Security`。
///
/// ## 契约（What）
/// - [`TransportError::new`] 按 `io::ErrorKind` 与 errno 自动分类；
/// - [`TransportError::with_category`] 覆盖分类（例如 TLS 失败）；
/// - [`TransportError::io`] 暴露底层错误，供 `raw_os_error()` 判定。
#[derive(Debug, Error)]
pub struct TransportError {
    op: OperationKind,
    category: ErrorCategory,
    #[source]
    source: io::Error,
}

impl TransportError {
    pub fn new(op: OperationKind, source: io::Error) -> Self {
        let category = categorize_io_error(&source);
        Self {
            op,
            category,
            source,
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn code(&self) -> &'static str {
        self.op.code
    }

    pub fn operation(&self) -> OperationKind {
        self.op
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn io(&self) -> &io::Error {
        &self.source
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        self.source.raw_os_error()
    }

    pub fn is_would_block(&self) -> bool {
        self.source.kind() == io::ErrorKind::WouldBlock
    }

    pub fn is_disconnect(&self) -> bool {
        self.category == ErrorCategory::Disconnected
    }

    pub fn into_io(self) -> io::Error {
        self.source
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op.message, self.source)
    }
}

/// 判断 `io::Error` 是否属于“对端已断开”类。
///
/// 对应 reset / not connected / shutdown / aborted / broken pipe / bad fd；
/// 另外把 `UnexpectedEof`（TLS 对端未发送 close_notify 即断开）归入此类。
pub fn is_disconnect_error(error: &io::Error) -> bool {
    use io::ErrorKind;
    if matches!(
        error.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    ) {
        return true;
    }
    is_disconnect_errno(error.raw_os_error())
}

#[cfg(unix)]
fn is_disconnect_errno(raw: Option<i32>) -> bool {
    use nix::errno::Errno;
    match raw {
        Some(code) => matches!(
            Errno::from_raw(code),
            Errno::ECONNRESET
                | Errno::ENOTCONN
                | Errno::ESHUTDOWN
                | Errno::ECONNABORTED
                | Errno::EPIPE
                | Errno::EBADF
        ),
        None => false,
    }
}

#[cfg(not(unix))]
fn is_disconnect_errno(_raw: Option<i32>) -> bool {
    false
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    if is_disconnect_error(error) {
        return ErrorCategory::Disconnected;
    }
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted => ErrorCategory::Retryable,
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        _ => ErrorCategory::NonRetryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: OperationKind = OperationKind::new("spark.transport.test.sample", "sample");

    #[test]
    fn disconnect_kinds_are_classified() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::NotConnected,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::BrokenPipe,
        ] {
            let err = TransportError::new(SAMPLE, io::Error::from(kind));
            assert!(err.is_disconnect(), "{kind:?} 应归类为断开");
        }
    }

    #[cfg(unix)]
    #[test]
    fn shutdown_and_bad_fd_errno_are_disconnects() {
        use nix::errno::Errno;
        for errno in [Errno::ESHUTDOWN, Errno::EBADF] {
            let err = TransportError::new(SAMPLE, io::Error::from_raw_os_error(errno as i32));
            assert_eq!(err.category(), ErrorCategory::Disconnected);
        }
    }

    #[test]
    fn would_block_is_retryable_and_display_carries_operation() {
        let err = TransportError::new(SAMPLE, io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_would_block());
        assert_eq!(err.category(), ErrorCategory::Retryable);
        assert_eq!(err.code(), "spark.transport.test.sample");
        assert!(err.to_string().starts_with("sample: "));
    }

    #[test]
    fn category_override_sticks() {
        let err = TransportError::new(SAMPLE, io::Error::other("bad certificate"))
            .with_category(ErrorCategory::Security);
        assert_eq!(err.category(), ErrorCategory::Security);
        assert!(!err.is_disconnect());
    }
}
