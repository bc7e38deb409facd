use std::time::Duration;

use crate::capture::domain::capture_source::{CaptureHandle, CaptureSource};
use crate::capture::domain::source_locator::SourceLocator;
use crate::shared::frame::Frame;

const V4L2_FORMAT_NAMES: &[&str] = &["video4linux2,v4l2", "video4linux2", "v4l2"];

/// Opens local devices and network streams via ffmpeg-next
/// (libavformat + libavcodec + libavdevice).
///
/// Each decoded frame is converted to RGB24 and wrapped in a [`Frame`].
/// `read_timeout` is passed to the protocol layer as `rw_timeout` so a
/// stalled stream fails a read instead of blocking it indefinitely.
pub struct FfmpegCapture {
    read_timeout: Duration,
}

impl FfmpegCapture {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    fn stream_options(&self, address: &str) -> ffmpeg_next::Dictionary<'static> {
        let mut options = ffmpeg_next::Dictionary::new();
        options.set(
            "rw_timeout",
            &self.read_timeout.as_micros().to_string(),
        );
        if address.starts_with("rtsp://") {
            options.set("rtsp_transport", "tcp");
        }
        options
    }

    fn open_input(
        &self,
        locator: &SourceLocator,
    ) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
        match locator {
            SourceLocator::Stream(address) => Ok(ffmpeg_next::format::input_with_dictionary(
                address,
                self.stream_options(address),
            )?),
            SourceLocator::Device(index) => {
                ffmpeg_next::device::register_all();
                let format = ffmpeg_next::device::input::video()
                    .find(|f| V4L2_FORMAT_NAMES.contains(&f.name()))
                    .ok_or("video4linux2 input format not available")?;
                let path = format!("/dev/video{index}");
                let context =
                    ffmpeg_next::format::open_with(&path, &format, ffmpeg_next::Dictionary::new())?;
                Ok(context.input())
            }
        }
    }
}

impl CaptureSource for FfmpegCapture {
    fn open(
        &self,
        locator: &SourceLocator,
    ) -> Result<Box<dyn CaptureHandle>, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let input = self.open_input(locator)?;
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok(Box::new(FfmpegHandle {
            input: Some(input),
            decoder,
            scaler,
            stream_index,
            width,
            height,
        }))
    }
}

struct FfmpegHandle {
    input: Option<ffmpeg_next::format::context::Input>,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

impl FfmpegHandle {
    fn try_receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb) {
            return Some(Err(Box::new(e)));
        }
        let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
        Some(Ok(Frame::new(pixels, self.width, self.height, 3, 0)))
    }
}

impl CaptureHandle for FfmpegHandle {
    fn read(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        if let Some(result) = self.try_receive() {
            return result;
        }
        loop {
            let input = self.input.as_mut().ok_or("capture handle released")?;
            let Some((stream, packet)) = input.packets().next() else {
                return Err("end of stream".into());
            };
            if stream.index() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            if let Some(result) = self.try_receive() {
                return result;
            }
        }
    }

    fn release(&mut self) {
        self.input = None;
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
