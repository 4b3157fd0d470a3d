// 该文件是 Saoma （扫码） 项目的一部分。
// src/region.rs - 检测框扩展与裁剪
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

use image::{GenericImageView, GrayImage, imageops};

use crate::{frame::BBox, model::Detection};

pub const DEFAULT_EXPAND_PERCENT: f32 = 5.0;

/// 扩展后右下角的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpperBound {
  /// 限制在图像宽高之内
  #[default]
  Clamp,
  /// 不限制右下角，超出图像的部分以黑色填充
  Unclamped,
}

/// 检测框外扩后的裁剪区域
#[derive(Debug, Clone)]
pub struct Region {
  pub crop: GrayImage,
  pub bounds: BBox,
  pub detection: Detection,
}

#[derive(Debug, Clone, Copy)]
pub struct RegionExtractor {
  expand_percent: f32,
  upper_bound: UpperBound,
}

impl Default for RegionExtractor {
  fn default() -> Self {
    Self {
      expand_percent: DEFAULT_EXPAND_PERCENT,
      upper_bound: UpperBound::default(),
    }
  }
}

impl RegionExtractor {
  pub fn with_expand_percent(mut self, expand_percent: f32) -> Self {
    self.expand_percent = expand_percent.max(0.0);
    self
  }

  pub fn with_upper_bound(mut self, upper_bound: UpperBound) -> Self {
    self.upper_bound = upper_bound;
    self
  }

  pub fn expand_percent(&self) -> f32 {
    self.expand_percent
  }

  /// 按宽高百分比向四周扩展（截断取整），左上角不小于 0
  pub fn expand(&self, bbox: &BBox, width: u32, height: u32) -> BBox {
    let expand_x = (bbox.width() as f32 * self.expand_percent / 100.0) as i32;
    let expand_y = (bbox.height() as f32 * self.expand_percent / 100.0) as i32;

    let x1 = (bbox.x1 - expand_x).max(0);
    let y1 = (bbox.y1 - expand_y).max(0);
    let x2 = bbox.x2 + expand_x;
    let y2 = bbox.y2 + expand_y;

    match self.upper_bound {
      UpperBound::Clamp => BBox::new(x1, y1, x2.min(width as i32), y2.min(height as i32)),
      UpperBound::Unclamped => BBox::new(x1, y1, x2, y2),
    }
  }

  /// 每个检测对应一个区域，顺序与输入一致
  pub fn extract(&self, image: &GrayImage, detections: &[Detection]) -> Vec<Region> {
    let (width, height) = image.dimensions();
    detections
      .iter()
      .map(|detection| {
        let bounds = self.expand(&detection.bbox, width, height);
        Region {
          crop: crop_padded(image, &bounds),
          bounds,
          detection: *detection,
        }
      })
      .collect()
  }
}

/// 裁剪 `bounds`，落在图像之外的像素为 0
fn crop_padded(image: &GrayImage, bounds: &BBox) -> GrayImage {
  let out_w = bounds.width().max(0) as u32;
  let out_h = bounds.height().max(0) as u32;
  let inside = bounds.clamp_to(image.width(), image.height());

  if inside == *bounds {
    return imageops::crop_imm(image, bounds.x1 as u32, bounds.y1 as u32, out_w, out_h).to_image();
  }

  let mut crop = GrayImage::new(out_w, out_h);
  if !inside.is_empty() {
    let view = image.view(
      inside.x1 as u32,
      inside.y1 as u32,
      inside.width() as u32,
      inside.height() as u32,
    );
    imageops::replace(
      &mut crop,
      &*view,
      (inside.x1 - bounds.x1) as i64,
      (inside.y1 - bounds.y1) as i64,
    );
  }
  crop
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  fn detection(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
    Detection {
      bbox: BBox::new(x1, y1, x2, y2),
      confidence: 0.9,
    }
  }

  #[test]
  fn expands_by_truncated_percentage() {
    let extractor = RegionExtractor::default();
    // 宽 50 -> 2，高 30 -> 1
    let bounds = extractor.expand(&BBox::new(10, 20, 60, 50), 200, 200);
    assert_eq!(bounds, BBox::new(8, 19, 62, 51));
  }

  #[test]
  fn lower_bound_is_clamped_at_zero() {
    let extractor = RegionExtractor::default().with_expand_percent(50.0);
    let bounds = extractor.expand(&BBox::new(2, 3, 42, 23), 100, 100);
    assert_eq!(bounds.x1, 0);
    assert_eq!(bounds.y1, 0);
  }

  #[test]
  fn clamped_upper_bound_stays_inside_image() {
    let extractor = RegionExtractor::default().with_expand_percent(20.0);
    let bounds = extractor.expand(&BBox::new(60, 60, 100, 80), 100, 80);
    assert_eq!(bounds, BBox::new(52, 56, 100, 80));
  }

  #[test]
  fn unclamped_upper_bound_exceeds_image_and_pads_crop() {
    let image = GrayImage::from_pixel(100, 80, Luma([200]));
    let extractor = RegionExtractor::default()
      .with_expand_percent(20.0)
      .with_upper_bound(UpperBound::Unclamped);

    let regions = extractor.extract(&image, &[detection(60, 60, 100, 80)]);
    assert_eq!(regions[0].bounds, BBox::new(52, 56, 108, 84));
    assert_eq!(regions[0].crop.dimensions(), (56, 28));
    assert_eq!(regions[0].crop.get_pixel(0, 0).0, [200]);
    assert_eq!(regions[0].crop.get_pixel(55, 27).0, [0]);
  }

  #[test]
  fn regions_follow_detection_order_and_contain_the_box() {
    let image = GrayImage::new(320, 240);
    let detections = [
      detection(100, 100, 200, 150),
      detection(0, 0, 40, 40),
      detection(300, 200, 320, 240),
    ];
    let regions = RegionExtractor::default().extract(&image, &detections);

    assert_eq!(regions.len(), detections.len());
    for (region, detection) in regions.iter().zip(detections.iter()) {
      assert_eq!(region.detection, *detection);
      assert!(region.bounds.contains(&detection.bbox));
      assert!(region.bounds.x1 >= 0 && region.bounds.y1 >= 0);
      assert_eq!(
        region.crop.dimensions(),
        (region.bounds.width() as u32, region.bounds.height() as u32)
      );
    }
  }
}
