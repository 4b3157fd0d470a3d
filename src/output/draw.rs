// 该文件是 Saoma （扫码） 项目的一部分。
// src/output/draw.rs - 解码结果可视化
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

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::{BBox, Frame};

// 常见发行版自带的字体位置
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
  "/Library/Fonts/Arial.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体读取错误 {0}: {1}")]
  FontIo(PathBuf, std::io::Error),
  #[error("字体文件无效: {0}")]
  FontInvalid(PathBuf),
}

/// 绘制在帧上的覆盖层，颜色均为 RGB
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
  Rect {
    bounds: BBox,
    color: [u8; 3],
    thickness: u32,
  },
  /// `(x, y)` 为文本基线左端
  Text {
    text: String,
    x: i32,
    y: i32,
    color: [u8; 3],
    scale: f32,
  },
}

/// 覆盖层绘制器
///
/// 没有可用字体时只画边框，文本覆盖层被跳过。
#[derive(Clone, Default)]
pub struct Painter {
  font: Option<FontArc>,
}

impl Painter {
  pub fn new(font: Option<FontArc>) -> Self {
    Self { font }
  }

  pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| DrawError::FontIo(path.to_path_buf(), e))?;
    let font = FontArc::try_from_vec(data).map_err(|_| DrawError::FontInvalid(path.to_path_buf()))?;
    Ok(Self::new(Some(font)))
  }

  /// 指定字体时必须能加载；否则在系统字体中查找
  pub fn load(font_path: Option<&Path>) -> Result<Self, DrawError> {
    match font_path {
      Some(path) => Self::from_font_file(path),
      None => Ok(Self::system()),
    }
  }

  pub fn system() -> Self {
    for candidate in SYSTEM_FONT_CANDIDATES {
      if let Ok(painter) = Self::from_font_file(candidate) {
        debug!("使用系统字体: {}", candidate);
        return painter;
      }
    }
    warn!("未找到可用字体，覆盖层将不包含文本");
    Self::default()
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn paint(&self, frame: &mut Frame, overlay: &Overlay) {
    match overlay {
      Overlay::Rect {
        bounds,
        color,
        thickness,
      } => {
        let color = frame.paint(*color);
        let image = frame.image_mut();
        // 线宽以边框为中心向内外展开
        let thickness = (*thickness).max(1) as i32;
        for i in 0..thickness {
          let d = i - (thickness - 1) / 2;
          let width = bounds.width() + 2 * d + 1;
          let height = bounds.height() + 2 * d + 1;
          if width <= 0 || height <= 0 {
            continue;
          }
          let rect = Rect::at(bounds.x1 - d, bounds.y1 - d).of_size(width as u32, height as u32);
          draw_hollow_rect_mut(image, rect, color);
        }
      }
      Overlay::Text {
        text,
        x,
        y,
        color,
        scale,
      } => {
        let Some(font) = &self.font else {
          return;
        };
        if text.is_empty() {
          return;
        }
        let color = frame.paint(*color);
        let scale = PxScale::from(*scale);
        let (_, text_height) = text_size(scale, font, text);
        let top = (*y - text_height as i32).max(0);
        draw_text_mut(frame.image_mut(), color, *x, top, scale, font, text);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn rect_is_drawn_in_frame_channel_order() {
    let mut frame = Frame::new(RgbImage::new(40, 40), crate::frame::ChannelOrder::Bgr);
    Painter::default().paint(
      &mut frame,
      &Overlay::Rect {
        bounds: BBox::new(5, 5, 20, 20),
        color: [255, 0, 0],
        thickness: 3,
      },
    );
    let image = frame.image();
    assert_eq!(image.get_pixel(5, 5).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(4, 12).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(6, 12).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(12, 12).0, [0, 0, 0]);
  }

  #[test]
  fn rect_outside_image_is_clipped() {
    let mut frame = Frame::from_rgb(RgbImage::new(20, 20));
    Painter::default().paint(
      &mut frame,
      &Overlay::Rect {
        bounds: BBox::new(10, 10, 40, 40),
        color: [0, 255, 0],
        thickness: 1,
      },
    );
    assert_eq!(frame.image().get_pixel(10, 15).0, [0, 255, 0]);
  }

  #[test]
  fn text_without_font_is_skipped() {
    let mut frame = Frame::from_rgb(RgbImage::new(20, 20));
    Painter::default().paint(
      &mut frame,
      &Overlay::Text {
        text: "HELLO".into(),
        x: 0,
        y: 10,
        color: [255, 255, 255],
        scale: 20.0,
      },
    );
    assert!(frame.as_raw().iter().all(|&b| b == 0));
  }

  #[test]
  fn missing_font_file_is_reported() {
    let err = Painter::load(Some(Path::new("/nonexistent/font.ttf"))).err();
    assert!(matches!(err, Some(DrawError::FontIo(..))));
  }
}
