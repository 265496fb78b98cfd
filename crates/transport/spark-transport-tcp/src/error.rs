use spark_transport::{OperationKind, TransportError};
use std::io;

pub(crate) const BIND: OperationKind =
    OperationKind::new("spark.transport.tcp.bind_failed", "tcp bind");
pub(crate) const LISTEN: OperationKind =
    OperationKind::new("spark.transport.tcp.listen_failed", "tcp listen");
pub(crate) const ACCEPT: OperationKind =
    OperationKind::new("spark.transport.tcp.accept_failed", "tcp accept");
pub(crate) const CONNECT: OperationKind =
    OperationKind::new("spark.transport.tcp.connect_failed", "tcp connect");
pub(crate) const READ: OperationKind =
    OperationKind::new("spark.transport.tcp.read_failed", "tcp read");
pub(crate) const WRITE: OperationKind =
    OperationKind::new("spark.transport.tcp.write_failed", "tcp write");
pub(crate) const SHUTDOWN: OperationKind =
    OperationKind::new("spark.transport.tcp.shutdown_failed", "tcp shutdown");
pub(crate) const CLOSE: OperationKind =
    OperationKind::new("spark.transport.tcp.close_failed", "tcp close");
pub(crate) const CONFIGURE: OperationKind =
    OperationKind::new("spark.transport.tcp.configure_failed", "tcp configure");

/// 将 IO 错误映射为传输层错误，分类由 [`TransportError::new`] 依据 errno 推断。
pub(crate) fn map_io_error(kind: OperationKind, error: io::Error) -> TransportError {
    TransportError::new(kind, error)
}

/// 套接字已关闭后的任何操作统一返回 `NotConnected`。
pub(crate) fn closed_error(kind: OperationKind) -> TransportError {
    TransportError::new(
        kind,
        io::Error::new(io::ErrorKind::NotConnected, "socket already closed"),
    )
}

/// 地址族不是 IPv4/IPv6 时使用。
pub(crate) fn unsupported_address(kind: OperationKind) -> TransportError {
    TransportError::new(
        kind,
        io::Error::new(io::ErrorKind::InvalidData, "non-inet socket address"),
    )
}
