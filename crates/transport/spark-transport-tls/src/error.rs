//! TLS 传输错误映射模块。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 将 `rustls`/IO 层的错误统一映射到 [`ErrorCategory`]，让分发器据此决定“关闭”还是“进入错误漏斗”；
//! - 提供稳定错误码与文案，使运维脚本能够根据错误定位问题，而无需解析底层库细节。
//!
//! ## 逻辑（How）
//! - `map_stream_error` 检查 `io::Error` 是否嵌套 `rustls::Error`，若是则按 TLS 语义分类，
//!   否则沿用传输层的 errno 分类；
//! - `categorize_rustls_error`/`alert_to_category` 区分证书、完整性类安全事件与普通失败。
//!
//! ## 风险与权衡（Trade-offs）
//! - `rustls::Error::General` 等泛型错误映射为 `NonRetryable`，避免误判为安全事件；
//! - 未穷举的 Alert 同样视作 `NonRetryable`，后续若需更精确分类可在此集中扩展。

use std::io;
use std::path::PathBuf;

use rustls::{AlertDescription, Error as RustlsError};
use rustls_pki_types::pem;
use spark_transport::{ErrorCategory, OperationKind, TransportError};
use thiserror::Error;

pub(crate) const HANDSHAKE: OperationKind =
    OperationKind::new("spark.transport.tls.handshake_failed", "tls handshake");
pub(crate) const READ: OperationKind =
    OperationKind::new("spark.transport.tls.read_failed", "tls read");
pub(crate) const WRITE: OperationKind =
    OperationKind::new("spark.transport.tls.write_failed", "tls write");
pub(crate) const FLUSH: OperationKind =
    OperationKind::new("spark.transport.tls.flush_failed", "tls flush");
pub(crate) const SESSION: OperationKind =
    OperationKind::new("spark.transport.tls.session_failed", "tls session");

/// 安全上下文构造阶段的错误。
///
/// # 契约（What）
/// - 每个变体都携带出错的文件路径或名称，便于直接定位配置问题；
/// - 构造失败意味着没有任何连接能够被派生，调用方应当中止启动。
#[derive(Debug, Error)]
pub enum TlsConfigError {
    /// PEM 文件无法读取或解析。
    #[error("failed to load PEM file `{path}`: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: pem::Error,
    },

    /// 证书文件中没有任何证书。
    #[error("no certificates found in `{path}`")]
    EmptyCertificateFile { path: PathBuf },

    /// CA 文件中的证书被信任库拒绝。
    #[error("CA bundle `{path}` rejected: {source}")]
    CaBundle {
        path: PathBuf,
        #[source]
        source: RustlsError,
    },

    /// 配置的 SNI 名称不是合法的 DNS 名或 IP。
    #[error("invalid server name `{name}`")]
    InvalidServerName { name: String },

    /// 上下文未加载证书链，无法以服务端身份握手。
    #[error("secure context has no certificate chain; server sessions are unavailable")]
    NoServerCertificate,

    /// 客户端证书校验器构建失败（例如信任库为空）。
    #[error(transparent)]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    /// rustls 拒绝了证书、私钥或协议版本组合。
    #[error(transparent)]
    Rustls(#[from] RustlsError),
}

/// 将读写/握手阶段的 `io::Error` 映射为 [`TransportError`]。
pub(crate) fn map_stream_error(kind: OperationKind, error: io::Error) -> TransportError {
    let tls_category = error
        .get_ref()
        .and_then(|source| source.downcast_ref::<RustlsError>())
        .map(categorize_rustls_error);
    let mapped = TransportError::new(kind, error);
    match tls_category {
        Some(category) => mapped.with_category(category),
        None => mapped,
    }
}

/// 将 `rustls::Error` 包装为 `InvalidData` 并分类。
pub(crate) fn map_rustls_error(kind: OperationKind, error: RustlsError) -> TransportError {
    let category = categorize_rustls_error(&error);
    TransportError::new(kind, io::Error::new(io::ErrorKind::InvalidData, error))
        .with_category(category)
}

/// 阻塞握手阶段的 `WouldBlock` 实为套接字超时。
pub(crate) fn handshake_timeout() -> TransportError {
    TransportError::new(
        HANDSHAKE,
        io::Error::new(io::ErrorKind::TimedOut, "tls handshake timed out"),
    )
}

pub(crate) fn not_established(kind: OperationKind) -> TransportError {
    TransportError::new(
        kind,
        io::Error::new(io::ErrorKind::NotConnected, "tls session not established"),
    )
}

pub(crate) fn config_error(kind: OperationKind, error: TlsConfigError) -> TransportError {
    TransportError::new(kind, io::Error::other(error))
}

fn categorize_rustls_error(error: &RustlsError) -> ErrorCategory {
    use RustlsError::*;
    match error {
        InappropriateMessage { .. }
        | InappropriateHandshakeMessage { .. }
        | InvalidEncryptedClientHello(_)
        | InvalidMessage(_)
        | PeerMisbehaved(_)
        | DecryptError
        | EncryptError
        | PeerSentOversizedRecord
        | NoCertificatesPresented
        | InvalidCertificate(_)
        | InvalidCertRevocationList(_)
        | UnsupportedNameType
        | NoApplicationProtocol => ErrorCategory::Security,
        AlertReceived(alert) => alert_to_category(alert),
        _ => ErrorCategory::NonRetryable,
    }
}

fn alert_to_category(alert: &AlertDescription) -> ErrorCategory {
    use AlertDescription::*;
    match alert {
        CloseNotify | UserCanceled => ErrorCategory::Disconnected,
        BadCertificate
        | UnsupportedCertificate
        | CertificateRevoked
        | CertificateExpired
        | CertificateUnknown
        | UnknownCA
        | NoCertificate
        | CertificateUnobtainable
        | CertificateRequired
        | AccessDenied
        | DecodeError
        | DecryptError
        | DecryptionFailed
        | HandshakeFailure
        | IllegalParameter
        | RecordOverflow
        | BadRecordMac
        | UnexpectedMessage
        | InsufficientSecurity
        | ProtocolVersion => ErrorCategory::Security,
        _ => ErrorCategory::NonRetryable,
    }
}
