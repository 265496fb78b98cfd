//! 证书校验装饰器。
//!
//! - [`AuditingClientVerifier`]：包装 rustls 的 WebPKI 客户端校验器，失败时记录证书主题并原样返回结论；
//! - [`UnverifiedServerCert`]：未配置 CA 时客户端使用，只校验握手签名、不校验证书链。

use std::sync::Arc;

use rustls::DistinguishedName;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, Error as RustlsError, SignatureScheme};

use crate::audit::{AuditSink, CertificateRejection};

const UNPARSEABLE_SUBJECT: &str = "<unparseable certificate>";

/// 读取证书主题的文本形式。
pub(crate) fn certificate_subject(der: &CertificateDer<'_>) -> String {
    match x509_parser::parse_x509_certificate(der.as_ref()) {
        Ok((_, cert)) => cert.subject().to_string(),
        Err(_) => UNPARSEABLE_SUBJECT.to_owned(),
    }
}

/// 带审计的客户端证书校验器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - rustls 的校验结论是唯一权威，本类型不做任何附加校验，只在失败时留下可追溯的主题信息；
/// - 将“记录”与“判定”分离，审计出口异常也不会放行非法证书。
///
/// ## 逻辑（How）
/// - 所有方法直接委托给内层校验器；
/// - `verify_client_cert` 返回 `Err` 时解析末端证书主题，交给 [`AuditSink`]，再返回同一个 `Err`。
#[derive(Debug)]
pub struct AuditingClientVerifier {
    inner: Arc<dyn ClientCertVerifier>,
    sink: Arc<dyn AuditSink>,
    session_id: String,
}

impl AuditingClientVerifier {
    pub fn new(
        inner: Arc<dyn ClientCertVerifier>,
        sink: Arc<dyn AuditSink>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            sink,
            session_id: session_id.into(),
        }
    }
}

impl ClientCertVerifier for AuditingClientVerifier {
    fn offer_client_auth(&self) -> bool {
        self.inner.offer_client_auth()
    }

    fn client_auth_mandatory(&self) -> bool {
        self.inner.client_auth_mandatory()
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, RustlsError> {
        self.inner
            .verify_client_cert(end_entity, intermediates, now)
            .inspect_err(|reason| {
                let subject = certificate_subject(end_entity);
                self.sink.invalid_peer_certificate(&CertificateRejection {
                    subject: &subject,
                    session_id: &self.session_id,
                    reason,
                });
            })
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// 不校验证书链的服务端证书校验器。
///
/// 仅在安全上下文未配置 CA 时使用：握手签名仍按 provider 支持的算法校验，
/// 但任何证书链都被接受。
#[derive(Debug)]
pub struct UnverifiedServerCert {
    provider: Arc<CryptoProvider>,
}

impl UnverifiedServerCert {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for UnverifiedServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
