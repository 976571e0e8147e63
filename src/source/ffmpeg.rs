//! FFmpeg-backed container decoding.
//!
//! Frames are decoded in-memory and scaled to tightly packed RGB24 before
//! entering the pipeline. End of the container is a normal terminal state;
//! decoder and demuxer failures surface as `SourceRead`.

use ffmpeg_next as ffmpeg;
use image::RgbImage;

use crate::error::{Error, Result};
use crate::frame::Frame;

pub(crate) struct FfmpegSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    flushed: bool,
}

impl FfmpegSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::source_read(path, format!("ffmpeg init: {e}")))?;
        let input = ffmpeg::format::input(&path)
            .map_err(|e| Error::source_read(path, format!("cannot open container: {e}")))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| Error::source_read(path, "no video track"))?;
        let stream_index = stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| Error::source_read(path, format!("decoder parameters: {e}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| Error::source_read(path, format!("cannot open decoder: {e}")))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| Error::source_read(path, format!("cannot create scaler: {e}")))?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            flushed: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb = ffmpeg::frame::Video::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.scaler
                    .run(&decoded, &mut rgb)
                    .map_err(|e| Error::source_read(&self.path, format!("scale to RGB: {e}")))?;
                let (pixels, width, height) = frame_pixels(&self.path, &rgb)?;
                let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
                    Error::source_read(&self.path, "decoded frame has inconsistent size")
                })?;
                let index = self.frame_count;
                self.frame_count += 1;
                return Ok(Some(Frame::new(image, index)));
            }

            if self.flushed {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .map_err(|e| Error::source_read(&self.path, format!("decode: {e}")))?;
                fed = true;
                break;
            }
            if !fed {
                // Demuxer drained; flush the decoder's delayed frames.
                self.decoder
                    .send_eof()
                    .map_err(|e| Error::source_read(&self.path, format!("flush: {e}")))?;
                self.flushed = true;
            }
        }
    }
}

fn frame_pixels(path: &str, frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end).ok_or_else(|| {
            Error::source_read(path, "frame row out of bounds")
        })?);
    }
    Ok((pixels, width, height))
}
