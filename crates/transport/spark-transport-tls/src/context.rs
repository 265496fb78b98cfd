use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::ClientConnection;
use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::{ServerConnection, ServerSessionMemoryCache, WebPkiClientVerifier};
use rustls::{ClientConfig, RootCertStore, ServerConfig, SupportedProtocolVersion};
use serde::Deserialize;
use spark_transport::Transport;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::error::TlsConfigError;
use crate::socket::SecureSocket;
use crate::verify::{AuditingClientVerifier, UnverifiedServerCert};

/// 每个安全上下文独立维护的服务端会话缓存容量。
const SESSION_CACHE_SIZE: usize = 256;

/// 允许协商的 TLS 协议版本。
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsProtocol {
    /// 由双方协商（TLS 1.2 与 TLS 1.3）。
    #[default]
    #[serde(alias = "sslv23")]
    Negotiate,
    #[serde(rename = "tls1.2")]
    Tls12,
    #[serde(rename = "tls1.3")]
    Tls13,
}

impl TlsProtocol {
    fn versions(self) -> &'static [&'static SupportedProtocolVersion] {
        static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
        static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
        match self {
            TlsProtocol::Negotiate => rustls::DEFAULT_VERSIONS,
            TlsProtocol::Tls12 => TLS12_ONLY,
            TlsProtocol::Tls13 => TLS13_ONLY,
        }
    }
}

/// 安全上下文的静态配置，可直接嵌入应用的 TOML 配置。
///
/// # 契约（What）
/// - `cert_file` 与 `key_file` 同时给出时才加载证书链，只给出其一会被忽略并告警；
/// - `ca_cert` 给出时，服务端强制要求并校验客户端证书，客户端按该 CA 校验服务端；
/// - `session_id` 用于会话缓存隔离与日志关联；
/// - `server_name` 为客户端握手的 SNI；
/// - `handshake_timeout_ms` 是握手期限：自 connect/accept 起算，超期后推进握手返回超时错误。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SecureContextConfig {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub session_id: String,
    pub protocol: TlsProtocol,
    pub server_name: String,
    pub handshake_timeout_ms: u64,
}

impl Default for SecureContextConfig {
    fn default() -> Self {
        Self {
            cert_file: None,
            key_file: None,
            ca_cert: None,
            session_id: "SSL".to_owned(),
            protocol: TlsProtocol::Negotiate,
            server_name: "localhost".to_owned(),
            handshake_timeout_ms: 10_000,
        }
    }
}

impl SecureContextConfig {
    /// 以证书与私钥路径构造配置，其余字段取默认值。
    pub fn new(cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        Self {
            cert_file: Some(cert_file.into()),
            key_file: Some(key_file.into()),
            ..Self::default()
        }
    }

    pub fn with_ca_cert(mut self, ca_cert: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(ca_cert.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_protocol(mut self, protocol: TlsProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// 可复用的安全上下文：一次构造，派生任意多条安全连接。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 证书解析、信任库构建与校验器装配都是昂贵且可能失败的操作，应在启动期一次完成；
/// - 之后每条连接只需从共享的 `ServerConfig`/`ClientConfig` 派生会话，失败面收敛到握手本身。
///
/// ## 逻辑（How）
/// - 使用 `aws-lc-rs` provider 与配置的协议版本分别构建服务端与客户端配置；
/// - 配置 CA 时，服务端校验器为 [`AuditingClientVerifier`] 包装的 WebPKI 校验器（强制客户端证书）；
/// - 未配置 CA 时，客户端使用 [`UnverifiedServerCert`]，只校验握手签名。
///
/// ## 契约（What）
/// - `Clone` 只复制内部 `Arc`，所有副本共享同一份配置与会话缓存；
/// - 未加载证书链的上下文只能用于客户端，`server_session` 返回 [`TlsConfigError::NoServerCertificate`]。
#[derive(Clone, Debug)]
pub struct SecureContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    config: SecureContextConfig,
    server: Option<Arc<ServerConfig>>,
    client: Arc<ClientConfig>,
    server_name: ServerName<'static>,
}

type Identity = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

impl SecureContext {
    /// 使用默认审计出口（`tracing`）构造上下文。
    pub fn new(config: SecureContextConfig) -> Result<Self, TlsConfigError> {
        Self::with_audit_sink(config, Arc::new(TracingAuditSink))
    }

    /// 使用自定义审计出口构造上下文。
    pub fn with_audit_sink(
        config: SecureContextConfig,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, TlsConfigError> {
        let provider = Arc::new(aws_lc_rs::default_provider());
        let server_name = ServerName::try_from(config.server_name.clone()).map_err(|_| {
            TlsConfigError::InvalidServerName {
                name: config.server_name.clone(),
            }
        })?;

        let identity = match (&config.cert_file, &config.key_file) {
            (Some(cert), Some(key)) => Some((load_certificates(cert)?, load_private_key(key)?)),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    target: "spark.transport.tls",
                    session_id = %config.session_id,
                    "certificate and key must be configured together; loading neither"
                );
                None
            }
        };
        let roots = config
            .ca_cert
            .as_deref()
            .map(load_roots)
            .transpose()?
            .map(Arc::new);

        let server = match &identity {
            Some(identity) => Some(Arc::new(build_server_config(
                &config, &provider, identity, roots.clone(), sink,
            )?)),
            None => None,
        };
        let client = Arc::new(build_client_config(&config, &provider, identity, roots)?);

        tracing::debug!(
            target: "spark.transport.tls",
            session_id = %config.session_id,
            server = server.is_some(),
            verify_peer = config.ca_cert.is_some(),
            "secure context ready"
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                config,
                server,
                client,
                server_name,
            }),
        })
    }

    /// 将原始传输绑定到本上下文，角色在 `connect`/`accept` 时确定。
    pub fn wrap_socket<T: Transport>(&self, raw: T) -> SecureSocket<T> {
        SecureSocket::new(raw, self.clone())
    }

    pub fn config(&self) -> &SecureContextConfig {
        &self.inner.config
    }

    pub fn session_id(&self) -> &str {
        &self.inner.config.session_id
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.inner.config.handshake_timeout()
    }

    /// 是否加载了证书链（即能否以服务端身份握手）。
    pub fn has_certificate(&self) -> bool {
        self.inner.server.is_some()
    }

    pub fn server_config(&self) -> Option<&Arc<ServerConfig>> {
        self.inner.server.as_ref()
    }

    pub fn client_config(&self) -> &Arc<ClientConfig> {
        &self.inner.client
    }

    /// 派生一条服务端会话。
    pub fn server_session(&self) -> Result<ServerConnection, TlsConfigError> {
        let config = self
            .inner
            .server
            .clone()
            .ok_or(TlsConfigError::NoServerCertificate)?;
        Ok(ServerConnection::new(config)?)
    }

    /// 派生一条客户端会话，SNI 取自配置。
    pub fn client_session(&self) -> Result<ClientConnection, TlsConfigError> {
        Ok(ClientConnection::new(
            Arc::clone(&self.inner.client),
            self.inner.server_name.clone(),
        )?)
    }
}

fn build_server_config(
    config: &SecureContextConfig,
    provider: &Arc<CryptoProvider>,
    (chain, key): &Identity,
    roots: Option<Arc<RootCertStore>>,
    sink: Arc<dyn AuditSink>,
) -> Result<ServerConfig, TlsConfigError> {
    let builder = ServerConfig::builder_with_provider(Arc::clone(provider))
        .with_protocol_versions(config.protocol.versions())?;
    let builder = match roots {
        Some(roots) => {
            let webpki =
                WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(provider)).build()?;
            let verifier = AuditingClientVerifier::new(webpki, sink, config.session_id.clone());
            builder.with_client_cert_verifier(Arc::new(verifier))
        }
        None => builder.with_no_client_auth(),
    };
    let mut server = builder.with_single_cert(chain.clone(), key.clone_key())?;
    server.session_storage = ServerSessionMemoryCache::new(SESSION_CACHE_SIZE);
    Ok(server)
}

fn build_client_config(
    config: &SecureContextConfig,
    provider: &Arc<CryptoProvider>,
    identity: Option<Identity>,
    roots: Option<Arc<RootCertStore>>,
) -> Result<ClientConfig, TlsConfigError> {
    let builder = ClientConfig::builder_with_provider(Arc::clone(provider))
        .with_protocol_versions(config.protocol.versions())?;
    let builder = match roots {
        Some(roots) => builder.with_root_certificates(roots),
        None => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(UnverifiedServerCert::new(Arc::clone(
                provider,
            )))),
    };
    Ok(match identity {
        Some((chain, key)) => builder.with_client_auth_cert(chain, key)?,
        None => builder.with_no_client_auth(),
    })
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let pem_error = |source| TlsConfigError::Pem {
        path: path.to_path_buf(),
        source,
    };
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(pem_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error)?;
    if certs.is_empty() {
        return Err(TlsConfigError::EmptyCertificateFile {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    PrivateKeyDer::from_pem_file(path).map_err(|source| TlsConfigError::Pem {
        path: path.to_path_buf(),
        source,
    })
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsConfigError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(path)? {
        roots.add(cert).map_err(|source| TlsConfigError::CaBundle {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(roots)
}
