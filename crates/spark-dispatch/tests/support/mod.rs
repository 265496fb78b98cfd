//! 测试用 PKI：一次性 CA、由其签发的服务端/客户端证书，以及一张由陌生 CA 签发的“流氓”客户端证书。

#![allow(dead_code)]

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use spark_transport_tls::SecureContextConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Pki {
    dir: TempDir,
}

pub struct Issuer {
    cert: Certificate,
    key: KeyPair,
}

fn issue_ca(name: &str) -> Issuer {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA 参数");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CommonName, name);
    let key = KeyPair::generate().expect("生成 CA 私钥");
    let cert = params.self_signed(&key).expect("签发 CA");
    Issuer { cert, key }
}

fn write_leaf(dir: &Path, stem: &str, common_name: &str, issuer: &Issuer) {
    let mut params = CertificateParams::new(vec!["localhost".to_owned()]).expect("叶子证书参数");
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let key = KeyPair::generate().expect("生成叶子私钥");
    let cert = params
        .signed_by(&key, &issuer.cert, &issuer.key)
        .expect("签发叶子证书");
    fs::write(dir.join(format!("{stem}.pem")), cert.pem()).expect("写入证书");
    fs::write(dir.join(format!("{stem}.key")), key.serialize_pem()).expect("写入私钥");
}

impl Pki {
    pub fn mint() -> Self {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let ca = issue_ca("spark test ca");
        fs::write(dir.path().join("ca.pem"), ca.cert.pem()).expect("写入 CA");
        write_leaf(dir.path(), "server", "spark-server", &ca);
        write_leaf(dir.path(), "client", "spark-client", &ca);

        let rogue_ca = issue_ca("rogue ca");
        write_leaf(dir.path(), "rogue", "rogue-client", &rogue_ca);
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn ca(&self) -> PathBuf {
        self.path("ca.pem")
    }

    /// 服务端：证书 + CA（强制客户端证书）。
    pub fn server_config(&self) -> SecureContextConfig {
        SecureContextConfig::new(self.path("server.pem"), self.path("server.key"))
            .with_ca_cert(self.ca())
    }

    /// 合法客户端：由同一 CA 签发的证书。
    pub fn client_config(&self) -> SecureContextConfig {
        SecureContextConfig::new(self.path("client.pem"), self.path("client.key"))
            .with_ca_cert(self.ca())
    }

    /// 由陌生 CA 签发证书的客户端；它仍信任服务端 CA。
    pub fn rogue_client_config(&self) -> SecureContextConfig {
        SecureContextConfig::new(self.path("rogue.pem"), self.path("rogue.key"))
            .with_ca_cert(self.ca())
    }

    /// 不出示任何证书的客户端。
    pub fn anonymous_client_config(&self) -> SecureContextConfig {
        SecureContextConfig::default().with_ca_cert(self.ca())
    }
}
