// 该文件是 Saoma （扫码） 项目的一部分。
// src/decoder.rs - 解码器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::panic::{AssertUnwindSafe, catch_unwind};

use image::GrayImage;
use thiserror::Error;
use tracing::warn;

use crate::frame::{BBox, PreparedFrame};

mod barcode;
mod qr;

pub use self::barcode::{CroppedDecoder, RxingReader};
pub use self::qr::QrDecoder;

/// 码制家族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeFamily {
  Barcode,
  Qr,
}

impl CodeFamily {
  /// 生成文件名前缀
  pub fn prefix(&self) -> &'static str {
    match self {
      CodeFamily::Barcode => "barcode",
      CodeFamily::Qr => "qr",
    }
  }

  /// 预览窗口标题
  pub fn window_title(&self) -> &'static str {
    match self {
      CodeFamily::Barcode => "DL Barcode Scanner",
      CodeFamily::Qr => "QR Video Scanner",
    }
  }

  pub fn display_name(&self) -> &'static str {
    match self {
      CodeFamily::Barcode => "条形码",
      CodeFamily::Qr => "二维码",
    }
  }
}

/// 哪些区域需要绘制边框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPolicy {
  /// 每个检测区域都画框，未解出的也保留以便排查
  EveryRegion,
  /// 只为解出内容的区域画框
  DecodedOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
  pub text: String,
  pub code_type: String,
}

/// 一帧中的一个候选区域及其解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRegion {
  pub bounds: BBox,
  pub payload: Option<DecodedPayload>,
}

#[derive(Error, Debug)]
pub enum ReadError {
  #[error("解码失败: {0}")]
  Decode(String),
  #[error("解码器异常退出: {0}")]
  Panicked(String),
}

/// 整帧解码：输入颜色转换后的帧，输出 `(区域, 内容?)` 序列
pub trait FrameDecoder {
  fn family(&self) -> CodeFamily;
  fn overlay_policy(&self) -> OverlayPolicy;
  fn decode_frame(&mut self, frame: &PreparedFrame<'_>) -> Vec<DecodedRegion>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
  fn family(&self) -> CodeFamily {
    (**self).family()
  }

  fn overlay_policy(&self) -> OverlayPolicy {
    (**self).overlay_policy()
  }

  fn decode_frame(&mut self, frame: &PreparedFrame<'_>) -> Vec<DecodedRegion> {
    (**self).decode_frame(frame)
  }
}

/// 单个裁剪区域的读码器，`Ok(None)` 表示未找到码
pub trait RegionReader {
  fn read(&mut self, crop: &GrayImage) -> Result<Option<DecodedPayload>, ReadError>;
}

/// 局部故障边界：错误与 panic 都记为“无内容”
pub(crate) fn guarded<T, E, F>(what: &str, f: F) -> Option<T>
where
  E: std::fmt::Display,
  F: FnOnce() -> Result<Option<T>, E>,
{
  match catch_unwind(AssertUnwindSafe(f)) {
    Ok(Ok(value)) => value,
    Ok(Err(e)) => {
      warn!("{}失败，按未解出处理: {}", what, e);
      None
    }
    Err(panic) => {
      let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "未知错误".to_string());
      warn!("{}时解码器异常，按未解出处理: {}", what, message);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn guarded_passes_values_through() {
    let value = guarded("读码", || Ok::<_, ReadError>(Some(7)));
    assert_eq!(value, Some(7));
  }

  #[test]
  fn guarded_turns_errors_into_none() {
    let value: Option<u8> = guarded("读码", || Err(ReadError::Decode("bad crop".into())));
    assert_eq!(value, None);
  }

  #[test]
  fn guarded_turns_panics_into_none() {
    let value: Option<u8> = guarded("读码", || -> Result<Option<u8>, ReadError> {
      panic!("malformed input")
    });
    assert_eq!(value, None);
  }
}
