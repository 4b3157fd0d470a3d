// 该文件是 Saoma （扫码） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 条形码检测模型
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

use image::{RgbImage, imageops::FilterType};
use ort::{session::Session, value::Tensor};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{DetectResult, Model, postprocess::decode_yolov8_output};

const YOLOV8_INPUT_SIZE: u32 = 640;
const YOLOV8_DEFAULT_CONFIDENCE: f32 = 0.15;
const YOLOV8_DEFAULT_NMS_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  RuntimeError(String),
}

impl Yolov8Error {
  fn runtime(e: impl std::fmt::Display) -> Self {
    Yolov8Error::RuntimeError(e.to_string())
  }
}

pub struct Yolov8Builder {
  model_path: PathBuf,
  confidence: f32,
  nms_threshold: f32,
  input_size: u32,
}

impl Yolov8Builder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      confidence: YOLOV8_DEFAULT_CONFIDENCE,
      nms_threshold: YOLOV8_DEFAULT_NMS_THRESHOLD,
      input_size: YOLOV8_INPUT_SIZE,
    }
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = nms_threshold;
    self
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn build(self) -> Result<Yolov8, Yolov8Error> {
    if !self.model_path.is_file() {
      return Err(Yolov8Error::ModelPathError(format!(
        "模型文件不存在: {}",
        self.model_path.display()
      )));
    }
    if !(0.0..=1.0).contains(&self.confidence) {
      return Err(Yolov8Error::ModelInvalid(format!(
        "置信度阈值 {} 超出范围 [0, 1]",
        self.confidence
      )));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()
      .map_err(Yolov8Error::runtime)?
      .commit_from_memory(&model_data)
      .map_err(Yolov8Error::runtime)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| Yolov8Error::ModelInvalid("模型没有输入".to_string()))?;
    let output_name = session
      .outputs
      .first()
      .map(|output| output.name.clone())
      .ok_or_else(|| Yolov8Error::ModelInvalid("模型没有输出".to_string()))?;

    debug!("模型输入: {}, 模型输出: {}", input_name, output_name);
    info!("模型加载完成");

    Ok(Yolov8 {
      session,
      input_name,
      output_name,
      confidence: self.confidence,
      nms_threshold: self.nms_threshold,
      input_size: self.input_size,
    })
  }
}

pub struct Yolov8 {
  session: Session,
  input_name: String,
  output_name: String,
  confidence: f32,
  nms_threshold: f32,
  input_size: u32,
}

impl Yolov8 {
  /// 缩放到模型输入尺寸，转为 NCHW 浮点张量并归一化到 [0, 1]
  fn preprocess(&self, image: &RgbImage) -> Result<ort::value::DynValue, Yolov8Error> {
    let size = self.input_size;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let raw = resized.as_raw();

    let plane = (size * size) as usize;
    let mut tensor_data = vec![0f32; 3 * plane];
    for idx in 0..plane {
      tensor_data[idx] = raw[idx * 3] as f32 / 255.0;
      tensor_data[plane + idx] = raw[idx * 3 + 1] as f32 / 255.0;
      tensor_data[2 * plane + idx] = raw[idx * 3 + 2] as f32 / 255.0;
    }

    let shape = [1usize, 3, size as usize, size as usize];
    Ok(
      Tensor::from_array((shape, tensor_data.into_boxed_slice()))
        .map_err(Yolov8Error::runtime)?
        .into_dyn(),
    )
  }
}

impl Model for Yolov8 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = Yolov8Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor = self.preprocess(input)?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => tensor])
      .map_err(Yolov8Error::runtime)?;

    let (shape, data) = outputs[self.output_name.as_str()]
      .try_extract_tensor::<f32>()
      .map_err(Yolov8Error::runtime)?;
    let dims: &[i64] = &shape;
    if dims.len() != 3 {
      return Err(Yolov8Error::ModelInvalid(format!(
        "预期输出为三维张量，实际形状 {:?}",
        dims
      )));
    }

    // 标准导出为 [1, 4 + nc, N]，候选数远大于属性数
    let (d1, d2) = (dims[1] as usize, dims[2] as usize);
    let transposed = d1 > d2;
    let (num_attrs, num_proposals) = if transposed { (d2, d1) } else { (d1, d2) };

    let scale = (
      input.width() as f32 / self.input_size as f32,
      input.height() as f32 / self.input_size as f32,
    );
    let result = decode_yolov8_output(
      data,
      num_attrs,
      num_proposals,
      transposed,
      scale,
      input.dimensions(),
      self.confidence,
      self.nms_threshold,
    );
    debug!("检测到 {} 个条形码区域", result.len());
    Ok(result)
  }
}
