// 该文件是 Saoma （扫码） 项目的一部分。
// src/decoder/qr.rs - 整帧二维码检测与解码
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

use rqrr::PreparedImage;
use tracing::debug;

use crate::{
  decoder::{
    CodeFamily, DecodedPayload, DecodedRegion, FrameDecoder, OverlayPolicy, ReadError, guarded,
  },
  frame::{BBox, PreparedFrame},
};

const QR_CODE_TYPE: &str = "QRCODE";

/// 在整帧上同时完成定位与解码
///
/// 检测结果与解码文本按位置一一对应；文本为空的条目不计为解出。
#[derive(Debug, Default)]
pub struct QrDecoder;

impl QrDecoder {
  pub fn new() -> Self {
    Self
  }
}

impl FrameDecoder for QrDecoder {
  fn family(&self) -> CodeFamily {
    CodeFamily::Qr
  }

  fn overlay_policy(&self) -> OverlayPolicy {
    OverlayPolicy::DecodedOnly
  }

  fn decode_frame(&mut self, frame: &PreparedFrame<'_>) -> Vec<DecodedRegion> {
    let luma = &frame.luma;
    let (width, height) = (luma.width() as usize, luma.height() as usize);
    if width == 0 || height == 0 {
      return Vec::new();
    }

    let regions = guarded("定位二维码", || {
      let mut prepared = PreparedImage::prepare_from_greyscale(width, height, |x, y| {
        luma.get_pixel(x as u32, y as u32)[0]
      });
      let grids = prepared.detect_grids();
      debug!("定位到 {} 个二维码", grids.len());

      let regions = grids
        .iter()
        .map(|grid| {
          let xs = grid.bounds.iter().map(|p| p.x);
          let ys = grid.bounds.iter().map(|p| p.y);
          let bounds = BBox::new(
            xs.clone().min().unwrap_or(0),
            ys.clone().min().unwrap_or(0),
            xs.max().unwrap_or(0),
            ys.max().unwrap_or(0),
          )
          .clamp_to(luma.width(), luma.height());

          let payload = guarded("解码二维码", || match grid.decode() {
            Ok((_meta, text)) if !text.is_empty() => Ok(Some(DecodedPayload {
              text,
              code_type: QR_CODE_TYPE.to_string(),
            })),
            Ok(_) => Ok(None),
            Err(e) => Err(ReadError::Decode(e.to_string())),
          });

          DecodedRegion { bounds, payload }
        })
        .collect::<Vec<_>>();
      Ok::<_, ReadError>(Some(regions))
    });

    regions.unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Frame;
  use image::RgbImage;

  #[test]
  fn blank_frame_has_no_codes() {
    let frame = Frame::from_rgb(RgbImage::from_pixel(120, 90, image::Rgb([255, 255, 255])));
    assert!(QrDecoder::new().decode_frame(&frame.prepare()).is_empty());
  }

  #[test]
  fn empty_frame_is_handled() {
    let frame = Frame::from_rgb(RgbImage::new(0, 0));
    assert!(QrDecoder::new().decode_frame(&frame.prepare()).is_empty());
  }
}
