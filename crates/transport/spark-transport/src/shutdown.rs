use std::net::Shutdown;

/// 半关闭方向。
///
/// TLS 关闭流程固定使用 [`ShutdownDirection::Both`]；单向关闭留给明文场景。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownDirection {
    Read,
    Write,
    Both,
}

impl From<ShutdownDirection> for Shutdown {
    fn from(value: ShutdownDirection) -> Self {
        match value {
            ShutdownDirection::Read => Shutdown::Read,
            ShutdownDirection::Write => Shutdown::Write,
            ShutdownDirection::Both => Shutdown::Both,
        }
    }
}
