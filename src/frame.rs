// 该文件是 Saoma （扫码） 项目的一部分。
// src/frame.rs - 帧与边界框定义
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

use std::borrow::Cow;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use thiserror::Error;

const COLOR_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
}

/// 像素通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 一帧 8 位三通道图像
///
/// 覆盖层直接绘制在帧内，像素保持来源给出的通道顺序。
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
  order: ChannelOrder,
}

impl Frame {
  pub fn new(image: RgbImage, order: ChannelOrder) -> Self {
    Self { image, order }
  }

  pub fn from_rgb(image: RgbImage) -> Self {
    Self::new(image, ChannelOrder::Rgb)
  }

  /// 由紧密排列的 HWC 字节构造
  pub fn from_raw(
    width: u32,
    height: u32,
    data: Vec<u8>,
    order: ChannelOrder,
  ) -> Result<Self, FrameError> {
    let expected = COLOR_CHANNELS * width as usize * height as usize;
    let actual = data.len();
    let image =
      RgbImage::from_raw(width, height, data).ok_or(FrameError::SizeMismatch { expected, actual })?;
    Ok(Self::new(image, order))
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    COLOR_CHANNELS
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn as_raw(&self) -> &[u8] {
    self.image.as_raw()
  }

  /// 按帧自身通道顺序存储的图像
  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn image_mut(&mut self) -> &mut RgbImage {
    &mut self.image
  }

  /// 把 RGB 颜色换成帧自身通道顺序下的像素值
  pub fn paint(&self, rgb: [u8; 3]) -> Rgb<u8> {
    match self.order {
      ChannelOrder::Rgb => Rgb(rgb),
      ChannelOrder::Bgr => Rgb([rgb[2], rgb[1], rgb[0]]),
    }
  }

  /// RGB 顺序的视图，必要时复制并交换通道
  pub fn to_rgb(&self) -> Cow<'_, RgbImage> {
    match self.order {
      ChannelOrder::Rgb => Cow::Borrowed(&self.image),
      ChannelOrder::Bgr => Cow::Owned(ImageBuffer::from_fn(
        self.image.width(),
        self.image.height(),
        |x, y| {
          let [b, g, r] = self.image.get_pixel(x, y).0;
          Rgb([r, g, b])
        },
      )),
    }
  }

  pub fn into_rgb(self) -> RgbImage {
    match self.order {
      ChannelOrder::Rgb => self.image,
      ChannelOrder::Bgr => self.to_rgb().into_owned(),
    }
  }

  /// 灰度图，使用 ITU-R BT.601 权重
  pub fn to_luma(&self) -> GrayImage {
    let (wr, wb) = match self.order {
      ChannelOrder::Rgb => (299u32, 114u32),
      ChannelOrder::Bgr => (114u32, 299u32),
    };
    ImageBuffer::from_fn(self.image.width(), self.image.height(), |x, y| {
      let [c0, c1, c2] = self.image.get_pixel(x, y).0;
      let value = (c0 as u32 * wr + c1 as u32 * 587 + c2 as u32 * wb + 500) / 1000;
      Luma([value.min(255) as u8])
    })
  }

  /// 为检测器与解码器准备输入
  pub fn prepare(&self) -> PreparedFrame<'_> {
    PreparedFrame {
      rgb: self.to_rgb(),
      luma: self.to_luma(),
    }
  }
}

/// 颜色转换之后的帧：检测器使用 RGB，解码器使用灰度
pub struct PreparedFrame<'a> {
  pub rgb: Cow<'a, RgbImage>,
  pub luma: GrayImage,
}

impl PreparedFrame<'_> {
  pub fn width(&self) -> u32 {
    self.luma.width()
  }

  pub fn height(&self) -> u32 {
    self.luma.height()
  }
}

/// 像素坐标下的轴对齐边界框 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl BBox {
  pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> i32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> i32 {
    self.y2 - self.y1
  }

  pub fn is_empty(&self) -> bool {
    self.width() <= 0 || self.height() <= 0
  }

  pub fn contains(&self, other: &BBox) -> bool {
    self.x1 <= other.x1 && self.y1 <= other.y1 && self.x2 >= other.x2 && self.y2 >= other.y2
  }

  /// 限制在 `[0, width] x [0, height]` 之内
  pub fn clamp_to(&self, width: u32, height: u32) -> BBox {
    let (w, h) = (width as i32, height as i32);
    BBox {
      x1: self.x1.clamp(0, w),
      y1: self.y1.clamp(0, h),
      x2: self.x2.clamp(0, w),
      y2: self.y2.clamp(0, h),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_raw_rejects_short_buffers() {
    let err = Frame::from_raw(4, 4, vec![0; 10], ChannelOrder::Rgb).unwrap_err();
    assert!(matches!(
      err,
      FrameError::SizeMismatch {
        expected: 48,
        actual: 10
      }
    ));
  }

  #[test]
  fn bgr_frames_convert_to_rgb() {
    let frame = Frame::from_raw(1, 1, vec![10, 20, 30], ChannelOrder::Bgr).unwrap();
    assert_eq!(frame.to_rgb().get_pixel(0, 0).0, [30, 20, 10]);
    assert_eq!(frame.paint([255, 0, 0]).0, [0, 0, 255]);
    assert_eq!(frame.into_rgb().get_pixel(0, 0).0, [30, 20, 10]);
  }

  #[test]
  fn luma_is_independent_of_channel_order() {
    let rgb = Frame::from_raw(1, 1, vec![200, 100, 50], ChannelOrder::Rgb).unwrap();
    let bgr = Frame::from_raw(1, 1, vec![50, 100, 200], ChannelOrder::Bgr).unwrap();
    assert_eq!(rgb.to_luma().get_pixel(0, 0), bgr.to_luma().get_pixel(0, 0));
  }

  #[test]
  fn bbox_clamp_keeps_box_inside_image() {
    let bbox = BBox::new(-5, 3, 120, 90).clamp_to(100, 80);
    assert_eq!(bbox, BBox::new(0, 3, 100, 80));
    assert!(BBox::new(0, 0, 100, 80).contains(&bbox));
  }
}
