// 该文件是 Saoma （扫码） 项目的一部分。
// src/model/postprocess.rs - YOLOv8 输出后处理
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

use tracing::debug;

use crate::{
  frame::BBox,
  model::{DetectResult, Detection},
};

/// 输出张量形状 `[1, 4 + nc, N]`（`transposed` 为 `[1, N, 4 + nc]`），
/// 每个候选为 `cx, cy, w, h` 加上各类别分数，坐标位于模型输入尺度。
#[allow(clippy::too_many_arguments)]
pub fn decode_yolov8_output(
  data: &[f32],
  num_attrs: usize,
  num_proposals: usize,
  transposed: bool,
  scale: (f32, f32),
  image_size: (u32, u32),
  confidence: f32,
  nms_threshold: f32,
) -> DetectResult {
  if num_attrs < 5 || data.len() < num_attrs * num_proposals {
    debug!(
      "输出张量大小异常: 属性数 {}, 候选数 {}, 数据长度 {}",
      num_attrs,
      num_proposals,
      data.len()
    );
    return DetectResult::default();
  }

  let at = |attr: usize, idx: usize| {
    if transposed {
      data[idx * num_attrs + attr]
    } else {
      data[attr * num_proposals + idx]
    }
  };

  let (scale_x, scale_y) = scale;
  let (image_w, image_h) = (image_size.0 as f32, image_size.1 as f32);
  let mut candidates = Vec::new();

  for idx in 0..num_proposals {
    let score = (4..num_attrs)
      .map(|attr| at(attr, idx))
      .fold(f32::MIN, f32::max);
    if score <= confidence {
      continue;
    }

    let (cx, cy, w, h) = (at(0, idx), at(1, idx), at(2, idx), at(3, idx));
    let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, image_w);
    let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, image_h);
    let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, image_w);
    let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, image_h);

    let bbox = BBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32);
    if bbox.is_empty() {
      continue;
    }
    candidates.push(Detection {
      bbox,
      confidence: score,
    });
  }

  debug!("阈值过滤后候选框 {} 个", candidates.len());
  non_max_suppression(candidates, nms_threshold).into()
}

/// 类别无关的非极大值抑制，结果按置信度降序排列
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    if kept
      .iter()
      .all(|k| iou(&k.bbox, &candidate.bbox) <= iou_threshold)
    {
      kept.push(candidate);
    }
  }
  kept
}

fn iou(a: &BBox, b: &BBox) -> f32 {
  let ix1 = a.x1.max(b.x1);
  let iy1 = a.y1.max(b.y1);
  let ix2 = a.x2.min(b.x2);
  let iy2 = a.y2.min(b.y2);
  let inter = ((ix2 - ix1).max(0) * (iy2 - iy1).max(0)) as f32;
  if inter == 0.0 {
    return 0.0;
  }
  let union = (a.width() * a.height() + b.width() * b.height()) as f32 - inter;
  inter / union
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Detection {
    Detection {
      bbox: BBox::new(x1, y1, x2, y2),
      confidence,
    }
  }

  #[test]
  fn nms_drops_overlapping_lower_scores() {
    let kept = non_max_suppression(
      vec![
        detection(0, 0, 10, 10, 0.6),
        detection(1, 1, 11, 11, 0.9),
        detection(50, 50, 60, 60, 0.3),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].confidence, 0.9);
    assert_eq!(kept[1].bbox, BBox::new(50, 50, 60, 60));
  }

  #[test]
  fn decodes_attribute_major_output() {
    // 两个候选，单类别：属性 [cx, cy, w, h, score]
    let num_proposals = 2;
    let data = vec![
      100.0, 300.0, // cx
      100.0, 300.0, // cy
      40.0, 20.0, // w
      20.0, 20.0, // h
      0.8, 0.1, // score
    ];
    let result = decode_yolov8_output(
      &data,
      5,
      num_proposals,
      false,
      (2.0, 1.0),
      (1280, 640),
      0.15,
      0.45,
    );
    assert_eq!(result.len(), 1);
    let item = result.items[0];
    assert_eq!(item.bbox, BBox::new(160, 90, 240, 110));
    assert!((item.confidence - 0.8).abs() < f32::EPSILON);
  }

  #[test]
  fn transposed_output_matches_attribute_major_output() {
    let data = vec![10.0, 10.0, 8.0, 8.0, 0.2, 0.9];
    let result = decode_yolov8_output(&data, 6, 1, true, (1.0, 1.0), (64, 64), 0.5, 0.45);
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].bbox, BBox::new(6, 6, 14, 14));
  }

  #[test]
  fn boxes_are_clamped_to_image() {
    let data = vec![2.0, 2.0, 10.0, 10.0, 0.9];
    let result = decode_yolov8_output(&data, 5, 1, false, (1.0, 1.0), (32, 32), 0.15, 0.45);
    assert_eq!(result.items[0].bbox, BBox::new(0, 0, 7, 7));
  }
}
