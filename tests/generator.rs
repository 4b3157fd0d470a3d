// 该文件是 Saoma （扫码） 项目的一部分。
// tests/generator.rs - 生成后再解码
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

use std::path::Path;

use saoma::{
  decoder::{CodeFamily, FrameDecoder, QrDecoder, RegionReader, RxingReader},
  generator::Generator,
  input::read_image,
};

#[test]
fn generated_code128_reads_back() {
  let dir = tempfile::tempdir().unwrap();
  let path = Generator::new(CodeFamily::Barcode, dir.path())
    .generate("HELLO123", None)
    .unwrap();
  assert_eq!(path, dir.path().join("barcode_HELLO123.png"));

  let frame = read_image(&path).unwrap();
  let payload = RxingReader::default()
    .read(&frame.to_luma())
    .unwrap()
    .unwrap();
  assert_eq!(payload.text, "HELLO123");
  assert_eq!(payload.code_type, "CODE_128");
}

#[test]
fn generated_qr_reads_back() {
  let dir = tempfile::tempdir().unwrap();
  let path = Generator::new(CodeFamily::Qr, dir.path())
    .generate("HELLO123", None)
    .unwrap();
  assert_eq!(path, dir.path().join("qr_HELLO123.png"));

  let frame = read_image(&path).unwrap();
  let regions = QrDecoder::new().decode_frame(&frame.prepare());
  assert_eq!(regions.len(), 1);
  let payload = regions[0].payload.as_ref().unwrap();
  assert_eq!(payload.text, "HELLO123");
}

#[test]
fn long_text_is_named_by_its_first_alphanumerics() {
  let dir = tempfile::tempdir().unwrap();
  let text = "https://example.com/items?id=42";
  let path = Generator::new(CodeFamily::Qr, dir.path())
    .generate(text, None)
    .unwrap();
  assert_eq!(path, dir.path().join("qr_httpsexamp.png"));

  let frame = read_image(&path).unwrap();
  let regions = QrDecoder::new().decode_frame(&frame.prepare());
  assert_eq!(
    regions[0].payload.as_ref().map(|p| p.text.as_str()),
    Some(text)
  );
}

#[test]
fn explicit_filename_is_kept() {
  let dir = tempfile::tempdir().unwrap();
  let path = Generator::new(CodeFamily::Barcode, dir.path())
    .generate("42", Some(Path::new("shelf-label.png")))
    .unwrap();
  assert_eq!(path, dir.path().join("shelf-label.png"));
  assert!(path.is_file());
}
