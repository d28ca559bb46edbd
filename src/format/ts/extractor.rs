use super::parser::{parse_layout, PacketLayout};
use super::pes::PesHeader;
use super::sync::{PacketReader, SyncStats};
use super::types::*;
use crate::error::{DemuxError, Result};
use crate::source::ByteSource;
use bytes::Bytes;
use log::{trace, warn};

const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// How the payload of a selected packet is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Elementary stream data; PES headers are stripped at unit starts.
    Pes,
    /// PSI section data, returned as carried (pointer field included).
    Section,
}

/// Payload bytes of one transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub pid: u16,
    pub kind: PayloadKind,
    /// Bytes from the payload offset to the end of the packet
    pub data: Bytes,
    pub unit_start: bool,
    pub continuity_counter: u8,
    /// Adaptation field discontinuity indicator
    pub discontinuity: bool,
    pub random_access: bool,
    /// Program clock reference in 27 MHz units
    pub pcr: Option<u64>,
    /// Stream id from the PES header, at PES unit starts only
    pub stream_id: Option<u8>,
    /// PTS carried by the PES header at this unit start
    pub pts: Option<u64>,
    /// DTS carried by the PES header at this unit start
    pub dts: Option<u64>,
    /// False for adaptation-only packets
    pub has_payload: bool,
}

/// Strips transport and PES framing off the packets of selected PIDs.
pub struct PayloadExtractor<S> {
    reader: PacketReader<S>,
    drop_transport_errors: bool,
    discarded: u64,
}

impl<S: ByteSource> PayloadExtractor<S> {
    pub fn new(source: S) -> Self {
        Self::from_reader(PacketReader::new(source))
    }

    pub fn from_reader(reader: PacketReader<S>) -> Self {
        Self {
            reader,
            drop_transport_errors: true,
            discarded: 0,
        }
    }

    /// Whether packets with the transport error indicator are dropped.
    pub fn set_drop_transport_errors(&mut self, drop: bool) {
        self.drop_transport_errors = drop;
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.reader.stats()
    }

    /// Packets read but not handed to any caller.
    pub fn discarded_packets(&self) -> u64 {
        self.discarded
    }

    pub fn source(&self) -> &S {
        self.reader.source()
    }

    pub fn source_mut(&mut self) -> &mut S {
        self.reader.source_mut()
    }

    pub fn into_source(self) -> S {
        self.reader.into_source()
    }

    /// Returns the payload of the next packet of `pid`, skipping all other
    /// PIDs, or `Ok(None)` once the source is exhausted.
    ///
    /// With `require_start`, packets without the payload unit start flag are
    /// skipped too. At a unit start the PES header is validated and
    /// stripped; a start code prefix other than `00 00 01` fails with
    /// [`DemuxError::ProtocolViolation`].
    pub fn extract_payload(&mut self, pid: u16, require_start: bool) -> Result<Option<Payload>> {
        self.next_payload(|header| {
            (header.pid == pid && (!require_start || header.payload_unit_start))
                .then_some(PayloadKind::Pes)
        })
    }

    /// Like [`extract_payload`](Self::extract_payload) but for PSI PIDs:
    /// the payload is returned without PES processing.
    pub fn extract_section_payload(
        &mut self,
        pid: u16,
        require_start: bool,
    ) -> Result<Option<Payload>> {
        self.next_payload(|header| {
            (header.pid == pid && (!require_start || header.payload_unit_start))
                .then_some(PayloadKind::Section)
        })
    }

    /// Returns the payload of the next packet `select` accepts.
    ///
    /// Packets whose adaptation field overruns the packet are corrupt and
    /// skipped with a warning.
    pub fn next_payload<F>(&mut self, mut select: F) -> Result<Option<Payload>>
    where
        F: FnMut(&TsHeader) -> Option<PayloadKind>,
    {
        loop {
            let packet = match self.reader.next_packet()? {
                Some(packet) => packet,
                None => return Ok(None),
            };

            let header = packet.header();
            if self.drop_transport_errors && header.transport_error {
                trace!("dropping packet with transport error on pid {:#06x}", header.pid);
                self.discarded += 1;
                continue;
            }

            let kind = match select(&header) {
                Some(kind) => kind,
                None => {
                    self.discarded += 1;
                    continue;
                }
            };

            let layout = match parse_layout(&packet) {
                Ok(layout) => layout,
                Err(e) => {
                    warn!("skipping corrupt packet on pid {:#06x}: {}", header.pid, e);
                    self.discarded += 1;
                    continue;
                }
            };

            match self.build_payload(&packet, kind, layout)? {
                Some(payload) => return Ok(Some(payload)),
                None => self.discarded += 1,
            }
        }
    }

    /// Returns `Ok(None)` for a PES unit start whose header does not fit in
    /// the packet. A wrong start code prefix is an error.
    fn build_payload(
        &self,
        packet: &TsPacket,
        kind: PayloadKind,
        layout: PacketLayout,
    ) -> Result<Option<Payload>> {
        let header = layout.header;
        let bytes = packet.as_bytes();
        let has_payload = header.adaptation_field_control.has_payload();
        let adaptation = layout.adaptation.unwrap_or_default();

        let mut payload = Payload {
            pid: header.pid,
            kind,
            data: Bytes::new(),
            unit_start: header.payload_unit_start,
            continuity_counter: header.continuity_counter,
            discontinuity: adaptation.discontinuity,
            random_access: adaptation.random_access,
            pcr: adaptation.pcr,
            stream_id: None,
            pts: None,
            dts: None,
            has_payload,
        };

        let mut offset = layout.payload_offset;
        if kind == PayloadKind::Pes && header.payload_unit_start && offset < TS_PACKET_SIZE {
            let body = &bytes[offset..];
            let present = body.len().min(START_CODE.len());
            if body[..present] != START_CODE[..present] {
                return Err(DemuxError::ProtocolViolation {
                    pid: header.pid,
                    reason: format!("PES start code prefix {:02x?}", &body[..present]),
                });
            }
            let pes = match PesHeader::parse(body) {
                Ok(pes) => pes,
                Err(e) => {
                    warn!("skipping PES unit start on pid {:#06x}: {}", header.pid, e);
                    return Ok(None);
                }
            };
            trace!(
                "pes unit start on pid {:#06x}: stream id {:#04x}, pts {:?}",
                header.pid,
                pes.stream_id,
                pes.pts
            );
            offset += pes.header_len();
            payload.stream_id = Some(pes.stream_id);
            payload.pts = pes.pts;
            payload.dts = pes.dts;
        }

        payload.data = Bytes::copy_from_slice(&bytes[offset..]);
        Ok(Some(payload))
    }
}
