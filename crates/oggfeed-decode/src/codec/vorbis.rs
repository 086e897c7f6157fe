//! Vorbis codec engine backed by symphonia.

use oggfeed_core::{Error, Result};
use symphonia::core::{
    audio::{AudioBuffer, AudioBufferRef},
    codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_VORBIS},
    formats::Packet as CodecPacket,
};
use tracing::{debug, trace};

use super::{CodecEngine, DecodedBlock, PacketDecoder, PlanarBuffer};
use crate::header::StreamHeaders;
use crate::ogg::Packet;

/// Opens symphonia Vorbis decoders from validated stream headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct VorbisEngine;

impl VorbisEngine {
    pub const fn new() -> Self {
        Self
    }
}

impl CodecEngine for VorbisEngine {
    type Decoder = VorbisPacketDecoder;

    fn open(&mut self, headers: &StreamHeaders) -> Result<Self::Decoder> {
        let [identification, _, setup] = &headers.packets;
        // The codec's extra data is the identification header followed by
        // the setup header.
        let mut extra_data = Vec::with_capacity(identification.len() + setup.len());
        extra_data.extend_from_slice(identification);
        extra_data.extend_from_slice(setup);

        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_VORBIS)
            .with_sample_rate(headers.identification.sample_rate)
            .with_extra_data(extra_data.into_boxed_slice());

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Codec(format!("Failed to create decoder: {e}")))?;

        debug!(
            "Vorbis decoder ready: {} channel(s), blocks {}/{}",
            headers.identification.channels,
            headers.identification.blocksize_short,
            headers.identification.blocksize_long
        );

        Ok(VorbisPacketDecoder {
            decoder,
            pending: PlanarBuffer::new(usize::from(headers.identification.channels)),
            scratch: None,
        })
    }
}

/// Per-stream symphonia decoder with its pending output.
pub struct VorbisPacketDecoder {
    decoder: Box<dyn Decoder>,
    pending: PlanarBuffer,
    scratch: Option<AudioBuffer<f32>>,
}

impl PacketDecoder for VorbisPacketDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<()> {
        let ts = packet
            .granule_position
            .and_then(|g| u64::try_from(g).ok())
            .unwrap_or(0);
        let input = CodecPacket::new_from_slice(0, ts, 0, &packet.data);

        let decoded = self
            .decoder
            .decode(&input)
            .map_err(|e| Error::Codec(format!("Packet {}: {e}", packet.packet_no)))?;
        trace!(
            "Packet {} decoded to {} frames",
            packet.packet_no,
            decoded.frames()
        );
        append_planar(&decoded, &mut self.pending, &mut self.scratch);
        Ok(())
    }

    fn pending(&self) -> Option<DecodedBlock<'_>> {
        self.pending.view()
    }

    fn acknowledge_consumed(&mut self, frames: usize) {
        self.pending.consume(frames);
    }
}

/// Copy a decoded symphonia buffer into `pending` as f32 planes.
pub(crate) fn append_planar(
    decoded: &AudioBufferRef<'_>,
    pending: &mut PlanarBuffer,
    scratch: &mut Option<AudioBuffer<f32>>,
) {
    if decoded.frames() == 0 {
        return;
    }

    if let AudioBufferRef::F32(buf) = decoded {
        let planes = buf.planes();
        pending.extend_planes(planes.planes().iter().copied());
        return;
    }

    let spec = *decoded.spec();
    let capacity = decoded.capacity();
    let reusable = scratch
        .as_ref()
        .is_some_and(|buf| buf.capacity() >= capacity && *buf.spec() == spec);
    if !reusable {
        *scratch = Some(AudioBuffer::new(capacity as u64, spec));
    }
    let Some(converted) = scratch.as_mut() else {
        return;
    };
    decoded.convert(converted);
    let planes = converted.planes();
    pending.extend_planes(planes.planes().iter().copied());
}
