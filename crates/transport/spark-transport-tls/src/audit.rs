use std::fmt;

use rustls::Error as RustlsError;

/// 一次被拒绝的对端证书。
#[derive(Debug)]
pub struct CertificateRejection<'a> {
    /// X.509 主题（RFC 4514 文本形式）；证书无法解析时为占位文本。
    pub subject: &'a str,
    /// 所属安全上下文的会话标识。
    pub session_id: &'a str,
    /// rustls 给出的拒绝原因。
    pub reason: &'a RustlsError,
}

/// 证书校验审计出口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 校验失败时运维最需要的是“谁被拒了”，但校验本身由 rustls 完成，结论不应被日志逻辑影响；
/// - 通过注入 trait object，测试可以捕获事件，生产环境可以接入审计系统。
///
/// ## 契约（What）
/// - 只在校验失败时调用，且调用发生在握手线程上，实现应当快速返回；
/// - 实现不得 panic，也无法改变校验结论。
pub trait AuditSink: Send + Sync + fmt::Debug {
    fn invalid_peer_certificate(&self, event: &CertificateRejection<'_>);
}

/// 默认审计出口：以 `error` 级别写入 `spark.transport.tls.verify` 目标。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn invalid_peer_certificate(&self, event: &CertificateRejection<'_>) {
        tracing::error!(
            target: "spark.transport.tls.verify",
            subject = event.subject,
            session_id = event.session_id,
            reason = %event.reason,
            "invalid client certificate with subject \"{}\"",
            event.subject,
        );
    }
}
