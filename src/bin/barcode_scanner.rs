// 该文件是 Saoma （扫码） 项目的一部分。
// src/bin/barcode_scanner.rs - 基于检测模型的条形码扫描
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use saoma::{
  args::CommonArgs,
  decoder::{CodeFamily, CroppedDecoder},
  model::Yolov8Builder,
  output::draw::Painter,
  pipeline::FramePipeline,
  region::{RegionExtractor, UpperBound},
  scanner::{Scanner, VideoOptions},
};

/// 条形码扫描与生成
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// YOLOv8 条形码检测模型（ONNX）
  #[arg(long, value_name = "FILE")]
  pub model: PathBuf,

  /// 检测置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.15, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.45, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 检测框向外扩展的百分比
  #[arg(long, default_value_t = 5.0, value_name = "PERCENT")]
  pub expand_percent: f32,

  /// 扩展后的右下角不限制在图像内
  #[arg(long)]
  pub unclamped_regions: bool,

  /// 结果保存目录
  #[arg(long, default_value = "barcode_results", value_name = "DIR")]
  pub save: PathBuf,

  #[command(flatten)]
  pub common: CommonArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("保存目录: {}", args.save.display());

  let model = Yolov8Builder::new(&args.model)
    .confidence(args.confidence)
    .nms_threshold(args.nms_threshold)
    .build()
    .context("无法加载检测模型")?;

  let upper_bound = if args.unclamped_regions {
    UpperBound::Unclamped
  } else {
    UpperBound::Clamp
  };
  let extractor = RegionExtractor::default()
    .with_expand_percent(args.expand_percent)
    .with_upper_bound(upper_bound);
  let decoder = CroppedDecoder::new(model).with_extractor(extractor);

  let painter = Painter::load(args.common.font.as_deref()).context("无法加载字体")?;
  let pipeline = FramePipeline::new(decoder).with_painter(painter);

  let mut scanner = Scanner::new(pipeline, &args.save)?;
  scanner
    .interrupt()
    .install_ctrlc()
    .context("无法设置 Ctrl-C 处理")?;

  let video = VideoOptions {
    output_video: args.common.output_video.clone(),
    fourcc: args.common.fourcc.parse().context("无效的 FourCC")?,
    display: !args.common.no_display,
    frame_number: args.common.frame_number,
    ..VideoOptions::for_family(CodeFamily::Barcode)
  };

  scanner.run(&args.common.actions(), &video)
}
