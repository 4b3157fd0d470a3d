// 该文件是 Saoma （扫码） 项目的一部分。
// src/bin/qr_scanner.rs - 二维码扫描
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
  decoder::{CodeFamily, QrDecoder},
  output::draw::Painter,
  pipeline::FramePipeline,
  scanner::{Scanner, VideoOptions},
};

/// 二维码扫描与生成
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 结果保存目录
  #[arg(long, default_value = "qr_results", value_name = "DIR")]
  pub save: PathBuf,

  #[command(flatten)]
  pub common: CommonArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("保存目录: {}", args.save.display());

  let painter = Painter::load(args.common.font.as_deref()).context("无法加载字体")?;
  let pipeline = FramePipeline::new(QrDecoder::new()).with_painter(painter);

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
    ..VideoOptions::for_family(CodeFamily::Qr)
  };

  scanner.run(&args.common.actions(), &video)
}
