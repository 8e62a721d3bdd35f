use tracing::debug;

use crate::capabilities::HardwareCapabilities;
use crate::catalog::decoder::Decoder;
use crate::error::PipelineError;
use crate::format::{HardwareAccelerationMode as Mode, PixelFormat, VideoFormat};

/// Parts of the request that change which decoder is safe to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderContext {
    pub deinterlace: bool,
    pub has_watermark: bool,
    pub has_subtitle: bool,
    pub scaling: bool,
}

/// Picks the decoder for `codec` under the resolved decoder `mode`.
///
/// Rules are tried in order and the first match wins; several rules force
/// software decoding for inputs that the accelerator mishandles even when
/// it claims support.
pub fn select_decoder(
    mode: Mode,
    codec: &VideoFormat,
    pixel_format: Option<PixelFormat>,
    context: DecoderContext,
    capabilities: &HardwareCapabilities,
) -> Result<Decoder, PipelineError> {
    if let VideoFormat::Other(_) = codec {
        return Err(PipelineError::UnsupportedCombination {
            stage: "decoder",
            mode,
            video_format: codec.clone(),
            pixel_format: pixel_format.map(|pf| pf.name().to_string()),
        });
    }

    let bit_depth = pixel_format.map(|pf| pf.bit_depth()).unwrap_or(8);
    let high_bit_depth = bit_depth > 8;
    let can_decode = |codec: &VideoFormat| capabilities.can_decode(mode, codec, bit_depth);

    let selected = match (mode, codec) {
        (Mode::Nvenc, VideoFormat::Hevc) if can_decode(codec) => Decoder::cuvid(codec),
        (Mode::Nvenc, VideoFormat::H264)
            if matches!(
                pixel_format,
                Some(PixelFormat::YUV420P10LE) | Some(PixelFormat::YUV444P10LE)
            ) =>
        {
            Decoder::software(codec)
        }
        (Mode::Nvenc, VideoFormat::Mpeg2Video) if context.deinterlace => Decoder::software(codec),
        (Mode::Nvenc, VideoFormat::H264) if can_decode(codec) => Decoder::cuvid(codec),
        (Mode::Nvenc, VideoFormat::Mpeg2Video | VideoFormat::Vc1 | VideoFormat::Mpeg4) => {
            Decoder::cuvid(codec)
        }
        (Mode::Nvenc, VideoFormat::Vp9 | VideoFormat::Av1) if can_decode(codec) => {
            Decoder::cuvid(codec)
        }

        // 10-bit hevc decoded by qsv shows green artifacts
        (Mode::Qsv, VideoFormat::Hevc) if pixel_format == Some(PixelFormat::YUV420P10LE) => {
            Decoder::software(codec)
        }
        (Mode::Qsv, VideoFormat::H264) if high_bit_depth => Decoder::software(codec),
        (Mode::Qsv, VideoFormat::H264 | VideoFormat::Mpeg2Video) if context.deinterlace => {
            Decoder::software(codec)
        }
        (
            Mode::Qsv,
            VideoFormat::Hevc
            | VideoFormat::H264
            | VideoFormat::Mpeg2Video
            | VideoFormat::Vc1
            | VideoFormat::Vp9
            | VideoFormat::Av1,
        ) => Decoder::qsv(codec),

        (Mode::Vaapi, _)
            if (!context.has_watermark && !context.has_subtitle) || context.scaling =>
        {
            Some(Decoder::implicit_hardware(Mode::Vaapi))
        }
        (Mode::VideoToolbox, _) => Some(Decoder::implicit_hardware(Mode::VideoToolbox)),

        (Mode::Rkmpp, VideoFormat::H264) if high_bit_depth => Decoder::software(codec),
        (
            Mode::Rkmpp,
            VideoFormat::H264
            | VideoFormat::Hevc
            | VideoFormat::Vp9
            | VideoFormat::Mpeg2Video
            | VideoFormat::Mpeg4
            | VideoFormat::Av1,
        ) => Decoder::rkmpp(codec),

        (
            Mode::V4l2m2m,
            VideoFormat::H264
            | VideoFormat::Hevc
            | VideoFormat::Mpeg2Video
            | VideoFormat::Mpeg4
            | VideoFormat::Vp9,
        ) if !high_bit_depth => Decoder::v4l2m2m(codec),

        _ => None,
    };

    let decoder = selected
        .or_else(|| Decoder::software(codec))
        .unwrap_or_else(Decoder::implicit_software);
    debug!(
        mode = %mode,
        codec = %codec,
        bit_depth,
        decoder = %decoder.label(),
        "selected decoder"
    );
    Ok(decoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FrameDataLocation;

    fn nvidia() -> HardwareCapabilities {
        HardwareCapabilities::nvidia((8, 6))
    }

    fn select(mode: Mode, codec: VideoFormat, pf: PixelFormat) -> Decoder {
        select_decoder(mode, &codec, Some(pf), DecoderContext::default(), &nvidia()).unwrap()
    }

    #[test]
    fn nvidia_ten_bit_h264_decodes_in_software() {
        let decoder = select(Mode::Nvenc, VideoFormat::H264, PixelFormat::YUV420P10LE);
        assert_eq!(decoder.engine_name(), Some("h264"));
        assert_eq!(decoder.output_location(), FrameDataLocation::Software);
        let decoder = select(Mode::Nvenc, VideoFormat::H264, PixelFormat::YUV420P);
        assert_eq!(decoder.engine_name(), Some("h264_cuvid"));
    }

    #[test]
    fn nvidia_deinterlaced_mpeg2_decodes_in_software() {
        let context = DecoderContext {
            deinterlace: true,
            ..DecoderContext::default()
        };
        let decoder = select_decoder(
            Mode::Nvenc,
            &VideoFormat::Mpeg2Video,
            Some(PixelFormat::YUV420P),
            context,
            &nvidia(),
        )
        .unwrap();
        assert_eq!(decoder.engine_name(), Some("mpeg2video"));
    }

    #[test]
    fn qsv_ten_bit_hevc_decodes_in_software() {
        let decoder = select(Mode::Qsv, VideoFormat::Hevc, PixelFormat::YUV420P10LE);
        assert_eq!(decoder.engine_name(), Some("hevc"));
        let decoder = select(Mode::Qsv, VideoFormat::Hevc, PixelFormat::YUV420P);
        assert_eq!(decoder.engine_name(), Some("hevc_qsv"));
    }

    #[test]
    fn vaapi_overlays_without_scaling_decode_in_software() {
        let context = DecoderContext {
            has_watermark: true,
            ..DecoderContext::default()
        };
        let caps = HardwareCapabilities::software();
        let decoder = select_decoder(
            Mode::Vaapi,
            &VideoFormat::H264,
            Some(PixelFormat::YUV420P),
            context,
            &caps,
        )
        .unwrap();
        assert_eq!(decoder.engine_name(), Some("h264"));

        let scaled = DecoderContext {
            scaling: true,
            ..context
        };
        let decoder = select_decoder(
            Mode::Vaapi,
            &VideoFormat::H264,
            Some(PixelFormat::YUV420P),
            scaled,
            &caps,
        )
        .unwrap();
        assert!(decoder.is_hardware());
        assert_eq!(decoder.engine_name(), None);
    }

    #[test]
    fn v4l2m2m_is_eight_bit_only() {
        let decoder = select(Mode::V4l2m2m, VideoFormat::Hevc, PixelFormat::YUV420P);
        assert_eq!(decoder.engine_name(), Some("hevc_v4l2m2m"));
        let decoder = select(Mode::V4l2m2m, VideoFormat::Hevc, PixelFormat::YUV420P10LE);
        assert_eq!(decoder.engine_name(), Some("hevc"));
    }

    #[test]
    fn twelve_bit_sources_get_a_software_decoder() {
        let decoder = select(Mode::Nvenc, VideoFormat::Hevc, PixelFormat::YUV420P12LE);
        assert_eq!(decoder.engine_name(), Some("hevc"));
        let decoder = select(Mode::Qsv, VideoFormat::H264, PixelFormat::YUV420P12LE);
        assert_eq!(decoder.engine_name(), Some("h264"));
        let decoder = select(Mode::None, VideoFormat::Hevc, PixelFormat::YUV444P12LE);
        assert_eq!(decoder.output_location(), FrameDataLocation::Software);

        let unknown: PixelFormat = "gbrp12le".parse().unwrap();
        let decoder = select(Mode::Rkmpp, VideoFormat::H264, unknown);
        assert_eq!(decoder.engine_name(), Some("h264"));
    }

    #[test]
    fn generated_sources_use_the_implicit_decoder() {
        let decoder = select(Mode::None, VideoFormat::GeneratedImage, PixelFormat::YUV420P);
        assert_eq!(decoder, Decoder::implicit_software());
    }

    #[test]
    fn unknown_codecs_are_rejected() {
        let result = select_decoder(
            Mode::Nvenc,
            &VideoFormat::Other("prores".into()),
            None,
            DecoderContext::default(),
            &nvidia(),
        );
        assert!(matches!(
            result,
            Err(PipelineError::UnsupportedCombination { stage: "decoder", .. })
        ));
    }

    #[test]
    fn every_known_combination_yields_one_decoder() {
        let formats = [
            PixelFormat::YUV420P,
            PixelFormat::YUV420P10LE,
            PixelFormat::YUV420P12LE,
        ];
        for mode in Mode::ALL {
            for codec in VideoFormat::DECODABLE {
                for pf in formats {
                    let decoder =
                        select_decoder(mode, &codec, Some(pf), DecoderContext::default(), &nvidia())
                            .unwrap();
                    let hardware_mode = decoder.mode();
                    if decoder.is_hardware() {
                        assert_eq!(hardware_mode, mode, "{mode} {codec} {pf}");
                    } else {
                        assert_ne!(decoder.output_location(), FrameDataLocation::Hardware);
                    }
                }
            }
        }
    }
}
