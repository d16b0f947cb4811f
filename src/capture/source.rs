//! Capture backends: open a local device index via `v4l`, or a URL by
//! shelling out to `ffmpeg` for a raw BGR24 pipe. The URL path reuses the
//! same subprocess-decode approach as `crate::media`'s `Transcoder`.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// A decoded BGR24 frame plus the actual dimensions the source produced
/// (which may differ from the requested resolution; the caller resizes).
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub trait CaptureSource: Send {
    fn read_frame(&mut self) -> Result<RawFrame>;
}

/// Driver-side mmap buffer count (spec §4.1 step 2: "set a small
/// driver-side buffer ... to keep latency low"). Few enough buffers that a
/// stalled reader can't accumulate a multi-frame backlog before the ring's
/// own drop-oldest semantics ever see it.
const DRIVER_BUFFER_COUNT: u32 = 3;

/// Local V4L2 device, opened by numeric index (`/dev/video{N}`).
pub struct V4lCaptureSource {
    stream: MmapStream<'static>,
    width: u32,
    height: u32,
}

impl V4lCaptureSource {
    pub fn open(device_index: u32, width: u32, height: u32) -> Result<Self> {
        let path = format!("/dev/video{}", device_index);
        let mut device = Device::with_path(&path)
            .with_context(|| format!("failed to open v4l device {}", path))?;

        let fmt = Format::new(width, height, FourCC::new(b"YUYV"));
        let fmt = device
            .set_format(&fmt)
            .with_context(|| format!("failed to set format on {}", path))?;

        // `set_format` may return a driver-negotiated size different from
        // what we asked for; the worker resizes to the configured
        // resolution regardless.
        let width = fmt.width;
        let height = fmt.height;

        // The `v4l` mmap stream needs a `'static` device reference; the
        // device is owned for the lifetime of the capture worker thread,
        // so leaking it here is the simplest way to satisfy that bound.
        let static_dev: &'static mut Device = Box::leak(Box::new(device));
        let stream = MmapStream::with_buffers(static_dev, Type::VideoCapture, DRIVER_BUFFER_COUNT)
            .context("failed to create mmap capture stream")?;

        Ok(V4lCaptureSource {
            stream,
            width,
            height,
        })
    }
}

impl CaptureSource for V4lCaptureSource {
    fn read_frame(&mut self) -> Result<RawFrame> {
        let (buf, meta) = self.stream.next().context("v4l read failed")?;
        let yuyv = &buf[..meta.bytesused as usize];
        let data = yuyv_to_bgr(yuyv, self.width, self.height)?;
        Ok(RawFrame {
            data,
            width: self.width,
            height: self.height,
        })
    }
}

/// Convert a packed YUYV 4:2:2 buffer to 8-bit BGR using the standard
/// ITU-R BT.601 coefficients.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixel_count = (width as usize) * (height as usize);
    if yuyv.len() < pixel_count * 2 {
        return Err(anyhow!(
            "short YUYV buffer: got {} bytes, expected {}",
            yuyv.len(),
            pixel_count * 2
        ));
    }
    let mut bgr = vec![0u8; pixel_count * 3];
    for (pair, out) in yuyv.chunks_exact(4).zip(bgr.chunks_exact_mut(6)) {
        let (y0, u, y1, v) = (pair[0] as i32, pair[1] as i32, pair[2] as i32, pair[3] as i32);
        let (b0, g0, r0) = yuv_to_bgr_pixel(y0, u, v);
        let (b1, g1, r1) = yuv_to_bgr_pixel(y1, u, v);
        out[0] = b0;
        out[1] = g0;
        out[2] = r0;
        out[3] = b1;
        out[4] = g1;
        out[5] = r1;
    }
    Ok(bgr)
}

fn yuv_to_bgr_pixel(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
    let c = y - 16;
    let d = u - 128;
    let e = v - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    (clamp_u8(b), clamp_u8(g), clamp_u8(r))
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Remote/file source: decodes via an `ffmpeg` subprocess into a raw
/// BGR24 pipe. Used whenever `CameraConfig::url` is not a bare device
/// index.
pub struct FfmpegUrlCaptureSource {
    child: Child,
    width: u32,
    height: u32,
    frame_bytes: usize,
}

impl FfmpegUrlCaptureSource {
    pub fn open(url: &str, width: u32, height: u32) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args([
                "-loglevel",
                "error",
                "-i",
                url,
                "-an",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgr24",
                "-s",
                &format!("{}x{}", width, height),
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn ffmpeg for {}", url))?;

        if child.stdout.is_none() {
            return Err(anyhow!("ffmpeg child has no stdout"));
        }

        Ok(FfmpegUrlCaptureSource {
            child,
            width,
            height,
            frame_bytes: width as usize * height as usize * 3,
        })
    }
}

impl CaptureSource for FfmpegUrlCaptureSource {
    fn read_frame(&mut self) -> Result<RawFrame> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg stdout closed"))?;
        let mut data = vec![0u8; self.frame_bytes];
        stdout
            .read_exact(&mut data)
            .context("ffmpeg pipe closed or short read")?;
        Ok(RawFrame {
            data,
            width: self.width,
            height: self.height,
        })
    }
}

impl Drop for FfmpegUrlCaptureSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// Open the appropriate backend for a camera's `url` field: an all-digit
/// string means a local device index, anything else is handed to the URL
/// backend.
pub fn open_source(
    url: &str,
    width: u32,
    height: u32,
) -> Result<Box<dyn CaptureSource>> {
    if !url.is_empty() && url.bytes().all(|b| b.is_ascii_digit()) {
        let index: u32 = url.parse().context("invalid device index")?;
        Ok(Box::new(V4lCaptureSource::open(index, width, height)?))
    } else {
        Ok(Box::new(FfmpegUrlCaptureSource::open(url, width, height)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_to_bgr_rejects_short_buffer() {
        let err = yuyv_to_bgr(&[0u8; 2], 2, 1).unwrap_err();
        assert!(err.to_string().contains("short YUYV buffer"));
    }

    #[test]
    fn yuyv_to_bgr_produces_expected_length() {
        // 2x1 YUYV frame = 4 bytes -> 2 BGR pixels = 6 bytes.
        let yuyv = [128u8, 128, 128, 128];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        assert_eq!(bgr.len(), 6);
    }
}
