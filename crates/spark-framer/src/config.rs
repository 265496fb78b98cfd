use serde::Deserialize;
use thiserror::Error;

/// 分帧器的缓冲参数，可直接嵌入应用的 TOML 配置。
///
/// - `in_buffer_size`：单次读事件最多读取的字节数；
/// - `out_buffer_size`：写队列的分块大小，也是单次写事件最多写出的字节数。
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FramerConfig {
    pub in_buffer_size: usize,
    pub out_buffer_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            in_buffer_size: 4096,
            out_buffer_size: 4096,
        }
    }
}

impl FramerConfig {
    pub fn with_in_buffer_size(mut self, size: usize) -> Self {
        self.in_buffer_size = size;
        self
    }

    pub fn with_out_buffer_size(mut self, size: usize) -> Self {
        self.out_buffer_size = size;
        self
    }

    /// 两个缓冲大小都必须大于 0。
    pub fn validate(&self) -> Result<(), FramerConfigError> {
        if self.in_buffer_size == 0 {
            return Err(FramerConfigError::ZeroBufferSize {
                field: "in_buffer_size",
            });
        }
        if self.out_buffer_size == 0 {
            return Err(FramerConfigError::ZeroBufferSize {
                field: "out_buffer_size",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramerConfigError {
    #[error("framer {field} must be greater than zero")]
    ZeroBufferSize { field: &'static str },
}
