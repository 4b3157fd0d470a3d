// 该文件是 Saoma （扫码） 项目的一部分。
// src/pipeline.rs - 单帧 检测 -> 解码 -> 标注 流程
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

use std::time::Instant;

use tracing::{debug, info};

use crate::{
  decoder::{
    CodeFamily, DecodedPayload, DecodedRegion, FrameDecoder, OverlayPolicy, ReadError, guarded,
  },
  frame::Frame,
  output::draw::{Overlay, Painter},
};

// 文本基线在框上方的距离，以及离画面顶端的最小距离
const TEXT_OFFSET: i32 = 10;
const TEXT_MIN_Y: i32 = 10;

/// 各码制的覆盖层样式，颜色为 RGB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
  pub box_color: [u8; 3],
  pub box_thickness: u32,
  pub text_color: [u8; 3],
  pub text_scale: f32,
}

impl OverlayStyle {
  pub fn for_family(family: CodeFamily) -> Self {
    match family {
      CodeFamily::Barcode => Self {
        box_color: [0, 255, 0],
        box_thickness: 3,
        text_color: [255, 0, 0],
        text_scale: 24.0,
      },
      CodeFamily::Qr => Self {
        box_color: [0, 255, 0],
        box_thickness: 2,
        text_color: [0, 255, 0],
        text_scale: 21.0,
      },
    }
  }
}

/// 一帧的处理结果
#[derive(Debug, Clone)]
pub struct FrameResult {
  pub index: u64,
  /// 已绘制覆盖层的帧
  pub frame: Frame,
  /// 至少解出一个内容（仅检测到不算）
  pub found_any: bool,
  pub regions: Vec<DecodedRegion>,
  /// 按绘制顺序记录的覆盖层
  pub overlays: Vec<Overlay>,
}

impl FrameResult {
  pub fn payloads(&self) -> impl Iterator<Item = &DecodedPayload> {
    self.regions.iter().filter_map(|r| r.payload.as_ref())
  }

  pub fn texts(&self) -> Vec<&str> {
    self.payloads().map(|p| p.text.as_str()).collect()
  }
}

pub struct FramePipeline<D> {
  decoder: D,
  painter: Painter,
  style: OverlayStyle,
}

impl<D: FrameDecoder> FramePipeline<D> {
  pub fn new(decoder: D) -> Self {
    let style = OverlayStyle::for_family(decoder.family());
    Self {
      decoder,
      painter: Painter::system(),
      style,
    }
  }

  pub fn with_painter(mut self, painter: Painter) -> Self {
    self.painter = painter;
    self
  }

  pub fn with_style(mut self, style: OverlayStyle) -> Self {
    self.style = style;
    self
  }

  pub fn family(&self) -> CodeFamily {
    self.decoder.family()
  }

  pub fn decoder(&self) -> &D {
    &self.decoder
  }

  /// 处理一帧，覆盖层直接绘制在帧上
  ///
  /// 解码器的错误与 panic 都不会向外传播，该帧按未解出处理。
  pub fn process(&mut self, mut frame: Frame, index: u64) -> FrameResult {
    let now = Instant::now();
    let family = self.decoder.family();

    let regions = {
      let prepared = frame.prepare();
      let decoder = &mut self.decoder;
      guarded("解码帧", || {
        Ok::<_, ReadError>(Some(decoder.decode_frame(&prepared)))
      })
      .unwrap_or_default()
    };
    let elapsed = now.elapsed();

    let overlays = self.overlays(&regions);
    for overlay in &overlays {
      self.painter.paint(&mut frame, overlay);
    }

    let mut found_any = false;
    for payload in regions.iter().filter_map(|r| r.payload.as_ref()) {
      found_any = true;
      info!("帧 {}: {} -> {}", index, payload.code_type, payload.text);
    }

    debug!(
      "帧 {} 处理完成: {} 个{}区域，解码耗时 {:.2?}，总耗时 {:.2?}",
      index,
      regions.len(),
      family.display_name(),
      elapsed,
      now.elapsed()
    );

    FrameResult {
      index,
      frame,
      found_any,
      regions,
      overlays,
    }
  }

  fn overlays(&self, regions: &[DecodedRegion]) -> Vec<Overlay> {
    let policy = self.decoder.overlay_policy();
    let style = &self.style;
    let mut overlays = Vec::new();

    for region in regions {
      let draw_box = match (&region.payload, policy) {
        (Some(_), _) => true,
        (None, OverlayPolicy::EveryRegion) => true,
        (None, OverlayPolicy::DecodedOnly) => false,
      };
      if !draw_box {
        continue;
      }

      overlays.push(Overlay::Rect {
        bounds: region.bounds,
        color: style.box_color,
        thickness: style.box_thickness,
      });

      if let Some(payload) = &region.payload {
        overlays.push(Overlay::Text {
          text: payload.text.clone(),
          x: region.bounds.x1,
          y: (region.bounds.y1 - TEXT_OFFSET).max(TEXT_MIN_Y),
          color: style.text_color,
          scale: style.text_scale,
        });
      }
    }

    overlays
  }
}
