// 该文件是 Saoma （扫码） 项目的一部分。
// src/input/image_folder.rs - 读取图像目录
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

use image::ImageReader;
use thiserror::Error;
use tracing::debug;

use crate::frame::Frame;

#[derive(Error, Debug)]
pub enum ImageFolderError {
  #[error("目录不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误 {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("图像读取错误 {0}: {1}")]
  ImageError(PathBuf, image::ImageError),
}

/// 目录中的图像文件，不递归，按文件名排序
///
/// 只收录形如 `*.*` 的普通文件，隐藏文件除外。
#[derive(Debug, Clone)]
pub struct ImageFolder {
  folder: PathBuf,
  paths: Vec<PathBuf>,
}

fn matches_pattern(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .is_some_and(|name| !name.starts_with('.') && name.contains('.'))
}

impl ImageFolder {
  pub fn open(folder: impl AsRef<Path>) -> Result<Self, ImageFolderError> {
    let folder = folder.as_ref();
    if !folder.is_dir() {
      return Err(ImageFolderError::NotFound(folder.to_path_buf()));
    }

    let entries =
      std::fs::read_dir(folder).map_err(|e| ImageFolderError::IoError(folder.to_path_buf(), e))?;
    let mut paths = Vec::new();
    for entry in entries {
      let path = entry
        .map_err(|e| ImageFolderError::IoError(folder.to_path_buf(), e))?
        .path();
      if path.is_file() && matches_pattern(&path) {
        paths.push(path);
      }
    }
    paths.sort();
    debug!("目录 {} 中有 {} 个候选文件", folder.display(), paths.len());

    Ok(Self {
      folder: folder.to_path_buf(),
      paths,
    })
  }

  pub fn folder(&self) -> &Path {
    &self.folder
  }

  pub fn paths(&self) -> &[PathBuf] {
    &self.paths
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

impl IntoIterator for ImageFolder {
  type Item = PathBuf;
  type IntoIter = std::vec::IntoIter<PathBuf>;

  fn into_iter(self) -> Self::IntoIter {
    self.paths.into_iter()
  }
}

/// 读取一张图像，格式按内容判断
pub fn read_image(path: impl AsRef<Path>) -> Result<Frame, ImageFolderError> {
  let path = path.as_ref();
  let image = ImageReader::open(path)
    .map_err(|e| ImageFolderError::IoError(path.to_path_buf(), e))?
    .with_guessed_format()
    .map_err(|e| ImageFolderError::IoError(path.to_path_buf(), e))?
    .decode()
    .map_err(|e| ImageFolderError::ImageError(path.to_path_buf(), e))?;
  Ok(Frame::from_rgb(image.to_rgb8()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn lists_dotted_files_sorted_without_recursing() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.png", "a.jpg", "README", ".hidden.png"] {
      std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    std::fs::create_dir(dir.path().join("nested.d")).unwrap();
    std::fs::write(dir.path().join("nested.d").join("c.png"), b"x").unwrap();

    let folder = ImageFolder::open(dir.path()).unwrap();
    let names: Vec<_> = folder
      .paths()
      .iter()
      .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
      .collect();
    assert_eq!(names, vec!["a.jpg", "b.png"]);
  }

  #[test]
  fn missing_folder_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFolder::open(dir.path().join("absent")),
      Err(ImageFolderError::NotFound(_))
    ));
  }

  #[test]
  fn reads_images_by_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelf.png");
    RgbImage::from_pixel(6, 4, image::Rgb([1, 2, 3]))
      .save(&path)
      .unwrap();
    let frame = read_image(&path).unwrap();
    assert_eq!((frame.width(), frame.height()), (6, 4));

    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();
    assert!(read_image(&broken).is_err());
  }
}
