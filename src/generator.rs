// 该文件是 Saoma （扫码） 项目的一部分。
// src/generator.rs - 条形码与二维码生成
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

use image::{GrayImage, Luma};
use rxing::{BarcodeFormat, MultiFormatWriter, Writer, common::BitMatrix};
use thiserror::Error;
use tracing::info;

use crate::decoder::CodeFamily;

/// 二维码每个模块的像素数
pub const QR_MODULE_SIZE: u32 = 10;
/// 条形码最窄条的像素宽度
pub const BARCODE_MODULE_WIDTH: u32 = 2;
pub const BARCODE_HEIGHT: u32 = 100;

const MAX_NAME_CHARS: usize = 10;

#[derive(Error, Debug)]
pub enum GenerateError {
  #[error("待编码的文本为空")]
  EmptyText,
  #[error("编码失败: {0}")]
  Encode(String),
  #[error("I/O 错误 {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("图像写入错误 {0}: {1}")]
  ImageError(PathBuf, image::ImageError),
}

/// 文件名中使用的文本：只保留字母数字，最多 10 个字符
pub fn sanitize(text: &str) -> String {
  text
    .chars()
    .filter(|c| c.is_alphanumeric())
    .take(MAX_NAME_CHARS)
    .collect()
}

pub struct Generator {
  family: CodeFamily,
  save_folder: PathBuf,
  module_size: u32,
  bar_height: u32,
}

impl Generator {
  pub fn new(family: CodeFamily, save_folder: impl Into<PathBuf>) -> Self {
    let module_size = match family {
      CodeFamily::Barcode => BARCODE_MODULE_WIDTH,
      CodeFamily::Qr => QR_MODULE_SIZE,
    };
    Self {
      family,
      save_folder: save_folder.into(),
      module_size,
      bar_height: BARCODE_HEIGHT,
    }
  }

  pub fn with_module_size(mut self, module_size: u32) -> Self {
    self.module_size = module_size.max(1);
    self
  }

  pub fn with_bar_height(mut self, bar_height: u32) -> Self {
    self.bar_height = bar_height.max(1);
    self
  }

  fn format(&self) -> BarcodeFormat {
    match self.family {
      CodeFamily::Barcode => BarcodeFormat::CODE_128,
      CodeFamily::Qr => BarcodeFormat::QR_CODE,
    }
  }

  /// `<前缀>_<文本>.png`，给出文件名时使用给定的文件名
  pub fn target_path(&self, text: &str, filename: Option<&Path>) -> PathBuf {
    match filename {
      Some(name) => {
        let mut path = self.save_folder.join(name);
        if path.extension().is_none() {
          path.set_extension("png");
        }
        path
      }
      None => self
        .save_folder
        .join(format!("{}_{}.png", self.family.prefix(), sanitize(text))),
    }
  }

  /// 编码为黑白图像，保留编码器给出的静区
  pub fn encode(&self, text: &str) -> Result<GrayImage, GenerateError> {
    if text.is_empty() {
      return Err(GenerateError::EmptyText);
    }
    let matrix = MultiFormatWriter::default()
      .encode(text, &self.format(), 0, 0)
      .map_err(|e| GenerateError::Encode(e.to_string()))?;

    Ok(match self.family {
      CodeFamily::Qr => scale_matrix(&matrix, self.module_size, self.module_size * matrix.height()),
      CodeFamily::Barcode => scale_matrix(&matrix, self.module_size, self.bar_height),
    })
  }

  pub fn generate(&self, text: &str, filename: Option<&Path>) -> Result<PathBuf, GenerateError> {
    let image = self.encode(text)?;
    let path = self.target_path(text, filename);

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|e| GenerateError::IoError(parent.into(), e))?;
    }
    image
      .save(&path)
      .map_err(|e| GenerateError::ImageError(path.clone(), e))?;

    info!("{}已保存: {}", self.family.display_name(), path.display());
    Ok(path)
  }
}

/// 横向每个模块放大 `module` 倍，纵向拉伸到 `height` 像素
fn scale_matrix(matrix: &BitMatrix, module: u32, height: u32) -> GrayImage {
  let rows = matrix.height().max(1);
  GrayImage::from_fn(matrix.width() * module, height, |x, y| {
    let row = (y as u64 * rows as u64 / height as u64) as u32;
    if matrix.get(x / module, row) {
      Luma([0])
    } else {
      Luma([255])
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sanitize_keeps_ten_alphanumerics() {
    assert_eq!(sanitize("https://example.com/a?b=1"), "httpsexamp");
    assert_eq!(sanitize("AB-12 cd"), "AB12cd");
    assert_eq!(sanitize("!!!"), "");
  }

  #[test]
  fn default_names_use_family_prefix() {
    let qr = Generator::new(CodeFamily::Qr, "qr_results");
    assert_eq!(
      qr.target_path("Hello, World!", None),
      Path::new("qr_results").join("qr_HelloWorld.png")
    );
    let barcode = Generator::new(CodeFamily::Barcode, "out");
    assert_eq!(
      barcode.target_path("x", Some(Path::new("label"))),
      Path::new("out").join("label.png")
    );
  }

  #[test]
  fn empty_text_is_rejected() {
    let generator = Generator::new(CodeFamily::Qr, "unused");
    assert!(matches!(generator.encode(""), Err(GenerateError::EmptyText)));
  }

  #[test]
  fn barcode_has_fixed_height() {
    let image = Generator::new(CodeFamily::Barcode, "unused")
      .encode("HELLO123")
      .unwrap();
    assert_eq!(image.height(), BARCODE_HEIGHT);
    assert_eq!(image.width() % BARCODE_MODULE_WIDTH, 0);
  }

  #[test]
  fn qr_is_square() {
    let image = Generator::new(CodeFamily::Qr, "unused").encode("HELLO123").unwrap();
    assert_eq!(image.width(), image.height());
    assert_eq!(image.width() % QR_MODULE_SIZE, 0);
  }
}
