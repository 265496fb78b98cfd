/// Reactor 上报的一次就绪快照，对应 poll 的 `POLLIN`/`POLLOUT`/`POLLPRI`/`POLLHUP`/`POLLERR`。
///
/// [`Dispatcher::readwrite`](crate::Dispatcher::readwrite) 依次把各标志翻译为
/// 读、写、优先数据与关闭事件。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub priority: bool,
    pub hangup: bool,
    pub error: bool,
}

impl Readiness {
    pub const fn readable() -> Self {
        Self {
            readable: true,
            writable: false,
            priority: false,
            hangup: false,
            error: false,
        }
    }

    pub const fn writable() -> Self {
        Self {
            readable: false,
            writable: true,
            priority: false,
            hangup: false,
            error: false,
        }
    }

    pub const fn priority() -> Self {
        Self {
            readable: false,
            writable: false,
            priority: true,
            hangup: false,
            error: false,
        }
    }

    pub const fn hangup() -> Self {
        Self {
            readable: false,
            writable: false,
            priority: false,
            hangup: true,
            error: false,
        }
    }

    pub const fn union(self, other: Self) -> Self {
        Self {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
            priority: self.priority || other.priority,
            hangup: self.hangup || other.hangup,
            error: self.error || other.error,
        }
    }

    /// 挂断或错误标志，二者都会直接触发关闭事件。
    pub const fn is_closed(&self) -> bool {
        self.hangup || self.error
    }

    pub const fn is_empty(&self) -> bool {
        !(self.readable || self.writable || self.priority || self.hangup || self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_combines_flags() {
        let ready = Readiness::readable().union(Readiness::hangup());
        assert!(ready.readable && ready.hangup);
        assert!(!ready.writable);
        assert!(ready.is_closed());
        assert!(Readiness::default().is_empty());
    }
}
