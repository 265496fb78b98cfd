//! 测试用 PKI：一次性 CA 以及由其签发的服务端/客户端证书。

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use spark_transport_tls::SecureContextConfig;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Pki {
    dir: TempDir,
}

impl Pki {
    pub fn mint() -> Self {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA 参数");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "framer test ca");
        let ca_key = KeyPair::generate().expect("生成 CA 私钥");
        let ca: Certificate = params.self_signed(&ca_key).expect("签发 CA");
        fs::write(dir.path().join("ca.pem"), ca.pem()).expect("写入 CA");

        for (stem, common_name) in [("server", "framer-server"), ("client", "framer-client")] {
            let mut params =
                CertificateParams::new(vec!["localhost".to_owned()]).expect("叶子证书参数");
            params.distinguished_name.push(DnType::CommonName, common_name);
            let key = KeyPair::generate().expect("生成叶子私钥");
            let cert = params.signed_by(&key, &ca, &ca_key).expect("签发叶子证书");
            fs::write(dir.path().join(format!("{stem}.pem")), cert.pem()).expect("写入证书");
            fs::write(dir.path().join(format!("{stem}.key")), key.serialize_pem()).expect("写入私钥");
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn server_config(&self) -> SecureContextConfig {
        SecureContextConfig::new(self.path("server.pem"), self.path("server.key"))
            .with_ca_cert(self.path("ca.pem"))
    }

    pub fn client_config(&self) -> SecureContextConfig {
        SecureContextConfig::new(self.path("client.pem"), self.path("client.key"))
            .with_ca_cert(self.path("ca.pem"))
    }
}
