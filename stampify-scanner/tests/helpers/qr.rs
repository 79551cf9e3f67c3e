//! Synthetic camera frames

use qrcode::{Color, QrCode};
use stampify_scanner::decoder::Frame;
use std::io::Cursor;

const MODULE_PX: usize = 4;
const QUIET_ZONE: usize = 4;

/// Greyscale rendering of `text` as a QR code with a quiet zone
pub fn qr_luma(text: &str) -> (usize, usize, Vec<u8>) {
    let code = QrCode::new(text.as_bytes()).expect("text fits in a QR code");
    let modules = code.width();
    let colors = code.to_colors();

    let side = (modules + 2 * QUIET_ZONE) * MODULE_PX;
    let mut luma = vec![255u8; side * side];
    for my in 0..modules {
        for mx in 0..modules {
            if colors[my * modules + mx] != Color::Dark {
                continue;
            }
            let x0 = (mx + QUIET_ZONE) * MODULE_PX;
            let y0 = (my + QUIET_ZONE) * MODULE_PX;
            for y in y0..y0 + MODULE_PX {
                for x in x0..x0 + MODULE_PX {
                    luma[y * side + x] = 0;
                }
            }
        }
    }
    (side, side, luma)
}

pub fn qr_frame(text: &str) -> Frame {
    let (w, h, luma) = qr_luma(text);
    Frame::from_luma(w, h, luma).unwrap()
}

pub fn blank_frame() -> Frame {
    Frame::from_luma(160, 120, vec![255; 160 * 120]).unwrap()
}

fn encode_png(width: usize, height: usize, luma: Vec<u8>) -> Vec<u8> {
    let img = image::GrayImage::from_raw(width as u32, height as u32, luma).unwrap();
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// PNG upload showing `text` as a QR code
pub fn qr_png(text: &str) -> Vec<u8> {
    let (w, h, luma) = qr_luma(text);
    encode_png(w, h, luma)
}

/// PNG upload with nothing on it
pub fn blank_png() -> Vec<u8> {
    encode_png(64, 64, vec![255; 64 * 64])
}
