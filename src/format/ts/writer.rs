use super::pes::PesHeader;
use super::psi::{PatSection, PmtSection};
use super::types::*;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;

/// Bytes available after the 4-byte header.
const MAX_PAYLOAD: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;

/// In-memory transport stream packetizer.
///
/// Writes PAT/PMT sections and PES packets as well-formed 188-byte packets,
/// keeping a continuity counter per PID. PES packets end with adaptation
/// field stuffing so that every payload byte belongs to the PES packet;
/// sections end with `0xFF` stuffing after the section.
#[derive(Debug, Default)]
pub struct TsWriter {
    buf: BytesMut,
    continuity_counters: HashMap<u16, u8>,
    discontinuity: bool,
}

impl TsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Sets the discontinuity indicator on the next packet written.
    pub fn mark_discontinuity(&mut self) {
        self.discontinuity = true;
    }

    /// Appends arbitrary bytes, e.g. to corrupt packet alignment.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Skips one continuity counter value on `pid`.
    pub fn skip_continuity(&mut self, pid: u16) {
        self.next_continuity_counter(pid);
    }

    fn next_continuity_counter(&mut self, pid: u16) -> u8 {
        let counter = self.continuity_counters.entry(pid).or_insert(0x0F);
        *counter = (*counter + 1) & 0x0F;
        *counter
    }

    /// Payload bytes the next packet can carry.
    fn packet_room(&self) -> usize {
        if self.discontinuity {
            MAX_PAYLOAD - 2
        } else {
            MAX_PAYLOAD
        }
    }

    /// Writes one packet carrying all of `payload`, which must fit in
    /// [`packet_room`](Self::packet_room). Short payloads are padded with
    /// adaptation field stuffing.
    fn write_packet(&mut self, pid: u16, unit_start: bool, payload: &[u8]) {
        debug_assert!(payload.len() <= self.packet_room());
        let continuity_counter = self.next_continuity_counter(pid);

        let field_len = MAX_PAYLOAD - payload.len();
        let afc = if field_len > 0 {
            AdaptationFieldControl::AdaptationAndPayload
        } else {
            AdaptationFieldControl::PayloadOnly
        };

        TsHeader {
            payload_unit_start: unit_start,
            pid,
            adaptation_field_control: afc,
            continuity_counter,
            ..Default::default()
        }
        .write_to(&mut self.buf);

        if field_len > 0 {
            let adaptation_length = field_len - 1;
            self.buf.put_u8(adaptation_length as u8);
            if adaptation_length > 0 {
                self.buf.put_u8(if self.discontinuity { 0x80 } else { 0x00 });
                self.buf.put_bytes(0xFF, adaptation_length - 1);
            }
            self.discontinuity = false;
        }
        self.buf.put_slice(payload);
    }

    /// Packetizes a PES packet. Returns the number of transport packets.
    ///
    /// The PES packet length field is filled in when it fits in 16 bits.
    pub fn write_pes(
        &mut self,
        pid: u16,
        stream_id: u8,
        pts: Option<u64>,
        dts: Option<u64>,
        data: &[u8],
    ) -> usize {
        let mut header = PesHeader::new(stream_id);
        header.data_alignment = true;
        if let Some(pts) = pts {
            header = header.with_pts(pts);
            if let Some(dts) = dts {
                header = header.with_dts(dts);
            }
        }
        let pes_len = header.header_len() - 6 + data.len();
        header.packet_length = u16::try_from(pes_len).unwrap_or(0);

        let mut pes = BytesMut::with_capacity(header.header_len() + data.len());
        header.write_to(&mut pes);
        pes.put_slice(data);

        let mut packets = 0;
        let mut pos = 0;
        while pos < pes.len() {
            let take = self.packet_room().min(pes.len() - pos);
            self.write_packet(pid, packets == 0, &pes[pos..pos + take]);
            pos += take;
            packets += 1;
        }
        packets
    }

    /// Packetizes a complete section behind a zero pointer field.
    pub fn write_section(&mut self, pid: u16, section: &[u8]) -> usize {
        let mut payload = BytesMut::with_capacity(section.len() + 1);
        payload.put_u8(0);
        payload.put_slice(section);

        let mut packets = 0;
        let mut pos = 0;
        while pos < payload.len() {
            let room = self.packet_room();
            let take = room.min(payload.len() - pos);
            let mut body = payload[pos..pos + take].to_vec();
            body.resize(room, 0xFF);
            self.write_packet(pid, packets == 0, &body);
            pos += take;
            packets += 1;
        }
        packets
    }

    /// Writes one packet whose payload is `payload` as given, pointer field
    /// included, padded with `0xFF`. Returns the number of payload bytes
    /// written; anything past the packet is dropped.
    pub fn write_section_packet(&mut self, pid: u16, unit_start: bool, payload: &[u8]) -> usize {
        let room = self.packet_room();
        let take = room.min(payload.len());
        let mut body = payload[..take].to_vec();
        body.resize(room, 0xFF);
        self.write_packet(pid, unit_start, &body);
        take
    }

    pub fn write_pat(&mut self, pat: &PatSection) -> usize {
        self.write_section(PID_PAT, &pat.to_bytes())
    }

    pub fn write_pmt(&mut self, pmt_pid: u16, pmt: &PmtSection) -> usize {
        self.write_section(pmt_pid, &pmt.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::parser::parse_layout;
    use pretty_assertions::assert_eq;

    fn packets(bytes: &[u8]) -> Vec<TsPacket> {
        bytes
            .chunks(TS_PACKET_SIZE)
            .map(|chunk| TsPacket::from_slice(chunk).unwrap())
            .collect()
    }

    #[test]
    fn test_pes_is_split_and_stuffed() {
        let mut writer = TsWriter::new();
        let data: Vec<u8> = (0..400u32).map(|i| i as u8).collect();
        assert_eq!(writer.write_pes(0x100, STREAM_ID_VIDEO, Some(90_000), None, &data), 3);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 3 * TS_PACKET_SIZE);

        let packets = packets(&bytes);
        assert!(packets[0].payload_unit_start());
        assert!(!packets[1].payload_unit_start());
        let counters: Vec<u8> = packets.iter().map(|p| p.header().continuity_counter).collect();
        assert_eq!(counters, vec![0, 1, 2]);

        let mut collected = Vec::new();
        for (i, packet) in packets.iter().enumerate() {
            let layout = parse_layout(packet).unwrap();
            let mut offset = layout.payload_offset;
            if i == 0 {
                offset += 14;
            }
            collected.extend_from_slice(&packet.as_bytes()[offset..]);
        }
        assert_eq!(collected, data);
    }

    #[test]
    fn test_payload_of_183_bytes_uses_empty_adaptation_field() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, None, None, &[0x5A; 183 - 9]);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), TS_PACKET_SIZE);
        let layout = parse_layout(&packets(&bytes)[0]).unwrap();
        assert_eq!(layout.adaptation.unwrap().length, 0);
        assert_eq!(layout.payload_offset, 5);
    }

    #[test]
    fn test_discontinuity_flag() {
        let mut writer = TsWriter::new();
        writer.mark_discontinuity();
        writer.write_pes(0x100, STREAM_ID_AUDIO, Some(1), None, &[0x01; 20]);
        let layout = parse_layout(&packets(&writer.into_bytes())[0]).unwrap();
        assert!(layout.adaptation.unwrap().discontinuity);
    }

    #[test]
    fn test_section_stuffing() {
        let mut writer = TsWriter::new();
        let section = [0x00, 0xB0, 0x0D, 1, 2, 3];
        assert_eq!(writer.write_section(PID_PAT, &section), 1);
        let bytes = writer.into_bytes();
        assert_eq!(&bytes[4..11], &[0x00, 0x00, 0xB0, 0x0D, 1, 2, 3]);
        assert!(bytes[11..].iter().all(|&b| b == 0xFF));
    }
}
