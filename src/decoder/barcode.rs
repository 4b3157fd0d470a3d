// 该文件是 Saoma （扫码） 项目的一部分。
// src/decoder/barcode.rs - 检测框引导的条形码解码
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

use image::{GrayImage, RgbImage};
use rxing::{
  BinaryBitmap, Exceptions, Luma8LuminanceSource, MultiUseMultiFormatReader, Reader,
  common::HybridBinarizer,
};
use tracing::{debug, warn};

use crate::{
  decoder::{
    CodeFamily, DecodedPayload, DecodedRegion, FrameDecoder, OverlayPolicy, ReadError,
    RegionReader, guarded,
  },
  frame::PreparedFrame,
  model::{DetectResult, Model},
  region::RegionExtractor,
};

/// 基于 rxing 的一维码读码器
///
/// 一个裁剪区域内有多个码时只取解码器报告的第一个。
#[derive(Default)]
pub struct RxingReader {
  reader: MultiUseMultiFormatReader,
}

impl RegionReader for RxingReader {
  fn read(&mut self, crop: &GrayImage) -> Result<Option<DecodedPayload>, ReadError> {
    let (width, height) = crop.dimensions();
    if width == 0 || height == 0 {
      return Ok(None);
    }

    let source = Luma8LuminanceSource::new(crop.as_raw().clone(), width, height);
    let mut bitmap = BinaryBitmap::new(HybridBinarizer::new(source));

    match self.reader.decode(&mut bitmap) {
      Ok(result) => Ok(Some(DecodedPayload {
        text: result.getText().to_string(),
        code_type: format!("{:?}", result.getBarcodeFormat()),
      })),
      Err(Exceptions::NotFoundException(_)) => Ok(None),
      Err(e) => Err(ReadError::Decode(e.to_string())),
    }
  }
}

/// 先检测再逐区域裁剪解码
pub struct CroppedDecoder<M, R = RxingReader> {
  model: M,
  extractor: RegionExtractor,
  reader: R,
}

impl<M> CroppedDecoder<M, RxingReader> {
  pub fn new(model: M) -> Self {
    Self::with_reader(model, RxingReader::default())
  }
}

impl<M, R> CroppedDecoder<M, R> {
  pub fn with_reader(model: M, reader: R) -> Self {
    Self {
      model,
      extractor: RegionExtractor::default(),
      reader,
    }
  }

  pub fn with_extractor(mut self, extractor: RegionExtractor) -> Self {
    self.extractor = extractor;
    self
  }
}

impl<M, R> FrameDecoder for CroppedDecoder<M, R>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: std::fmt::Display,
  R: RegionReader,
{
  fn family(&self) -> CodeFamily {
    CodeFamily::Barcode
  }

  fn overlay_policy(&self) -> OverlayPolicy {
    OverlayPolicy::EveryRegion
  }

  fn decode_frame(&mut self, frame: &PreparedFrame<'_>) -> Vec<DecodedRegion> {
    let detections = match self.model.infer(&frame.rgb) {
      Ok(result) => result,
      Err(e) => {
        warn!("检测失败，本帧按无检测处理: {}", e);
        return Vec::new();
      }
    };
    debug!("检测到 {} 个候选区域", detections.len());

    let reader = &mut self.reader;
    self
      .extractor
      .extract(&frame.luma, &detections.items)
      .into_iter()
      .map(|region| DecodedRegion {
        bounds: region.bounds,
        payload: guarded("读取条形码", || reader.read(&region.crop)),
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::{BBox, Frame},
    model::Detection,
  };

  struct FailingModel;

  impl Model for FailingModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = String;

    fn infer(&mut self, _input: &RgbImage) -> Result<DetectResult, String> {
      Err("推理失败".to_string())
    }
  }

  struct FixedModel(Vec<Detection>);

  impl Model for FixedModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = String;

    fn infer(&mut self, _input: &RgbImage) -> Result<DetectResult, String> {
      Ok(self.0.clone().into())
    }
  }

  struct PanickingReader;

  impl RegionReader for PanickingReader {
    fn read(&mut self, _crop: &GrayImage) -> Result<Option<DecodedPayload>, ReadError> {
      panic!("index out of range")
    }
  }

  #[test]
  fn detector_failure_yields_no_regions() {
    let frame = Frame::from_rgb(RgbImage::new(32, 32));
    let mut decoder = CroppedDecoder::new(FailingModel);
    assert!(decoder.decode_frame(&frame.prepare()).is_empty());
  }

  #[test]
  fn reader_panic_keeps_region_without_payload() {
    let frame = Frame::from_rgb(RgbImage::new(64, 64));
    let detection = Detection {
      bbox: BBox::new(10, 10, 30, 30),
      confidence: 0.5,
    };
    let mut decoder = CroppedDecoder::with_reader(FixedModel(vec![detection]), PanickingReader);
    let regions = decoder.decode_frame(&frame.prepare());
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].bounds, BBox::new(9, 9, 31, 31));
    assert_eq!(regions[0].payload, None);
  }

  #[test]
  fn blank_crop_reads_as_miss() {
    let crop = GrayImage::from_pixel(80, 40, image::Luma([255]));
    assert_eq!(RxingReader::default().read(&crop).unwrap(), None);
  }
}
