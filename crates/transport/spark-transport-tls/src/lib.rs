#![deny(unsafe_code)]
#![doc = r#"
# spark-transport-tls

## 设计动机（Why）
- **同构契约**：加密连接必须以与明文套接字完全相同的 `Transport` 契约出现，分发器与分帧器无需感知 TLS；
- **可审计**：客户端证书校验失败时记录证书主题，但校验结论始终以 rustls 为准；
- **一次构造、多次派生**：证书、信任库与校验器在 [`SecureContext`] 中一次装配，之后每条连接只派生会话。

## 核心契约（What）
- [`SecureContextConfig`]：证书/私钥/CA 路径、会话标识、协议版本、SNI 与握手超时，可从 TOML 反序列化；
- [`SecureContext`]：由配置构建，`wrap_socket` 将任意 `Transport` 包装为 [`SecureSocket`]；
- [`SecureSocket`]：实现 `Transport`，额外提供 `context()`、`peer_certificates()` 与 TLS 有序关闭；
- [`AuditSink`]：证书拒绝事件出口，默认实现 [`TracingAuditSink`]。

## 实现策略（How）
- 使用 `rustls`（`aws-lc-rs` provider）的同步 API：`read_tls`/`process_new_packets`/`write_tls`；
- 握手在非阻塞模式下随读写事件推进，`accept` 不等待对端，服务端握手由新连接自己的读写事件完成；
- 单次 `recv` 取不完的已解密明文通过 `pending_read` 报告，读方应在同一事件内继续读取。

## 风险与考量（Trade-offs）
- 未配置 CA 时客户端不校验服务端证书链，仅校验握手签名；
- 握手期限只在推进握手时检查，从不再发送任何字节的对端需要由上层的空闲清理回收。
"#]

mod audit;
mod context;
mod error;
mod io;
mod socket;
mod verify;

pub use audit::{AuditSink, CertificateRejection, TracingAuditSink};
pub use context::{SecureContext, SecureContextConfig, TlsProtocol};
pub use error::TlsConfigError;
pub use socket::{SecureSocket, SecureState};
pub use verify::{AuditingClientVerifier, UnverifiedServerCert};
