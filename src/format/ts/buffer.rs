use super::extractor::Payload;
use super::psi::{section_size, SectionAssembler};
use super::types::MAX_SECTION_LENGTH;
use crate::config::PrimingPolicy;
use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace, warn};

pub use super::extractor::PayloadKind as PidKind;

/// Lifecycle of a registered PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Payload is discarded until a clean stream start is seen.
    Priming,
    /// Payload is buffered for the consumer.
    Ready,
}

/// Result of checking a packet's continuity counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    InOrder,
    /// Same counter as the previous packet; the packet repeats it.
    Duplicate,
    /// Packets went missing; `expected` is the counter that was due.
    Gap { expected: u8 },
}

/// Growable byte buffer owned by the demuxer for one registered PID.
///
/// The logical capacity grows in steps of `growth_increment` whenever an
/// append would overflow it. Consumed bytes are released from the front.
/// Section PIDs buffer complete, reassembled PSI sections back to back.
#[derive(Debug)]
pub struct PidBuffer {
    pid: u16,
    kind: PidKind,
    state: BufferState,
    data: BytesMut,
    capacity: usize,
    growth_increment: usize,
    last_pts: Option<u64>,
    last_dts: Option<u64>,
    last_cc: Option<u8>,
    assembler: Option<SectionAssembler>,
    growths: u64,
}

impl PidBuffer {
    pub fn new(pid: u16, kind: PidKind, capacity: usize, growth_increment: usize) -> Self {
        Self {
            pid,
            kind,
            state: BufferState::Priming,
            data: BytesMut::with_capacity(capacity),
            capacity,
            growth_increment: growth_increment.max(1),
            last_pts: None,
            last_dts: None,
            last_cc: None,
            assembler: (kind == PidKind::Section).then(SectionAssembler::new),
            growths: 0,
        }
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn kind(&self) -> PidKind {
        self.kind
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Number of buffered bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Logical capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent PTS routed to this PID, regardless of consumption.
    pub fn last_pts(&self) -> Option<u64> {
        self.last_pts
    }

    pub fn last_dts(&self) -> Option<u64> {
        self.last_dts
    }

    /// Times the buffer had to grow.
    pub fn growths(&self) -> u64 {
        self.growths
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Checks the continuity counter of `payload` against the previous one.
    ///
    /// Only packets carrying payload advance the counter. A discontinuity
    /// indicator restarts tracking.
    pub fn check_continuity(&mut self, payload: &Payload) -> Continuity {
        if !payload.has_payload {
            return Continuity::InOrder;
        }
        let cc = payload.continuity_counter;
        let previous = self.last_cc.replace(cc);
        match previous {
            Some(prev) if !payload.discontinuity => {
                let expected = (prev + 1) & 0x0F;
                if cc == expected {
                    Continuity::InOrder
                } else if cc == prev {
                    Continuity::Duplicate
                } else {
                    Continuity::Gap { expected }
                }
            }
            _ => Continuity::InOrder,
        }
    }

    /// Applies the priming policy to `payload`. Returns whether the payload
    /// should be buffered.
    pub fn admit(&mut self, policy: PrimingPolicy, payload: &Payload) -> bool {
        if self.state == BufferState::Ready {
            return true;
        }
        let start = match (self.kind, policy) {
            (_, PrimingPolicy::Disabled) => true,
            // Sections carry no timestamps; a unit start is the clean boundary.
            (PidKind::Section, _) => payload.unit_start,
            (PidKind::Pes, PrimingPolicy::UntilUnitStart) => payload.unit_start,
            (PidKind::Pes, PrimingPolicy::UntilTimestamp) => payload.unit_start && payload.pts.is_some(),
        };
        if start {
            debug!("pid {:#06x} primed, pts {:?}", self.pid, payload.pts);
            self.state = BufferState::Ready;
        }
        start
    }

    /// Appends the payload of an admitted packet, recording its timestamps.
    /// Returns true when the buffer had to grow.
    pub fn push(&mut self, payload: &Payload) -> bool {
        if payload.pts.is_some() {
            self.last_pts = payload.pts;
            self.last_dts = payload.dts;
        }

        let assembler = match self.assembler.as_mut() {
            Some(assembler) => assembler,
            None => return self.append(&payload.data),
        };
        assembler.push(payload);

        let mut sections = Vec::new();
        while let Some(section) = assembler.pop_section() {
            sections.push(section);
        }
        let mut grew = false;
        for section in sections {
            if !well_sized(&section) {
                warn!(
                    "pid {:#06x}: dropping oversized section of {} bytes",
                    self.pid,
                    section.len()
                );
                continue;
            }
            grew |= self.append(&section);
        }
        grew
    }

    fn append(&mut self, bytes: &[u8]) -> bool {
        let needed = self.data.len() + bytes.len();
        let mut grew = false;
        if needed > self.capacity {
            let shortfall = needed - self.capacity;
            let steps = shortfall.div_ceil(self.growth_increment);
            let old = self.capacity;
            self.capacity += steps * self.growth_increment;
            self.growths += 1;
            grew = true;
            debug!(
                "pid {:#06x} buffer grown from {} to {} bytes",
                self.pid, old, self.capacity
            );
        }
        self.data.reserve(self.capacity - self.data.len());
        self.data.extend_from_slice(bytes);
        trace!("pid {:#06x}: buffered {} bytes, {} held", self.pid, bytes.len(), self.data.len());
        grew
    }

    /// Releases up to `n` bytes from the front. Returns the count released.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.data.len());
        self.data.advance(n);
        n
    }

    /// Removes and returns up to `max` bytes from the front.
    pub fn take(&mut self, max: usize) -> Bytes {
        let n = max.min(self.data.len());
        self.data.split_to(n).freeze()
    }

    /// Copies up to `buf.len()` bytes out and consumes them.
    pub fn copy_to(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data.advance(n);
        n
    }

    /// Removes the first complete section of a section PID.
    pub fn take_section(&mut self) -> Option<Bytes> {
        let size = section_size(&self.data)?;
        (self.data.len() >= size).then(|| self.data.split_to(size).freeze())
    }

    /// Drops all buffered bytes and timestamps and returns to priming.
    pub fn reset(&mut self) {
        self.data.clear();
        self.state = BufferState::Priming;
        self.last_pts = None;
        self.last_dts = None;
        self.last_cc = None;
        if let Some(assembler) = self.assembler.as_mut() {
            assembler.reset();
        }
    }
}

fn well_sized(section: &[u8]) -> bool {
    section_size(section) == Some(section.len()) && section.len() <= MAX_SECTION_LENGTH + 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload(unit_start: bool, pts: Option<u64>, cc: u8, data: &[u8]) -> Payload {
        Payload {
            pid: 0x100,
            kind: PidKind::Pes,
            data: Bytes::copy_from_slice(data),
            unit_start,
            continuity_counter: cc,
            discontinuity: false,
            random_access: false,
            pcr: None,
            stream_id: None,
            pts,
            dts: None,
            has_payload: true,
        }
    }

    #[test]
    fn test_growth_preserves_bytes() {
        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 8, 4);
        assert!(!buffer.push(&payload(true, Some(1), 0, &[1, 2, 3, 4, 5, 6])));
        assert!(buffer.push(&payload(false, None, 1, &[7, 8, 9, 10, 11])));
        assert_eq!(buffer.capacity(), 12);
        assert_eq!(buffer.growths(), 1);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_large_append_grows_in_whole_steps() {
        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 0, 10);
        buffer.push(&payload(true, None, 0, &[0xAB; 25]));
        assert_eq!(buffer.capacity(), 30);
        assert_eq!(buffer.len(), 25);
    }

    #[test]
    fn test_consume_from_front() {
        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 64, 64);
        buffer.push(&payload(true, Some(5), 0, &[1, 2, 3, 4, 5]));
        assert_eq!(&buffer.take(2)[..], &[1, 2]);
        let mut out = [0u8; 2];
        assert_eq!(buffer.copy_to(&mut out), 2);
        assert_eq!(out, [3, 4]);
        assert_eq!(buffer.consume(10), 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_pts(), Some(5));
    }

    #[test]
    fn test_priming_policies() {
        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 64, 64);
        assert!(!buffer.admit(PrimingPolicy::UntilTimestamp, &payload(false, None, 0, &[1])));
        assert!(!buffer.admit(PrimingPolicy::UntilTimestamp, &payload(true, None, 1, &[1])));
        assert_eq!(buffer.state(), BufferState::Priming);
        assert!(buffer.admit(PrimingPolicy::UntilTimestamp, &payload(true, Some(9), 2, &[1])));
        assert!(buffer.admit(PrimingPolicy::UntilTimestamp, &payload(false, None, 3, &[1])));

        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 64, 64);
        assert!(buffer.admit(PrimingPolicy::UntilUnitStart, &payload(true, None, 0, &[1])));

        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 64, 64);
        assert!(buffer.admit(PrimingPolicy::Disabled, &payload(false, None, 0, &[1])));
        assert_eq!(buffer.state(), BufferState::Ready);
    }

    #[test]
    fn test_continuity() {
        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 64, 64);
        assert_eq!(buffer.check_continuity(&payload(true, None, 14, &[])), Continuity::InOrder);
        assert_eq!(buffer.check_continuity(&payload(false, None, 15, &[])), Continuity::InOrder);
        assert_eq!(buffer.check_continuity(&payload(false, None, 0, &[])), Continuity::InOrder);
        assert_eq!(buffer.check_continuity(&payload(false, None, 0, &[])), Continuity::Duplicate);
        assert_eq!(
            buffer.check_continuity(&payload(false, None, 3, &[])),
            Continuity::Gap { expected: 1 }
        );

        let mut jump = payload(false, None, 9, &[]);
        jump.discontinuity = true;
        assert_eq!(buffer.check_continuity(&jump), Continuity::InOrder);
    }

    #[test]
    fn test_reset_returns_to_priming() {
        let mut buffer = PidBuffer::new(0x100, PidKind::Pes, 64, 64);
        buffer.admit(PrimingPolicy::Disabled, &payload(true, Some(3), 0, &[1]));
        buffer.push(&payload(true, Some(3), 0, &[1, 2]));
        buffer.reset();
        assert_eq!(buffer.state(), BufferState::Priming);
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_pts(), None);
    }

    #[test]
    fn test_section_pid_buffers_whole_sections() {
        let section = [0x00, 0xB0, 0x05, 0x00, 0x01, 0xC1, 0x00, 0x00];
        let mut first = vec![0x00];
        first.extend_from_slice(&section[..4]);
        let mut start = payload(true, None, 0, &first);
        start.kind = PidKind::Section;
        let mut rest = payload(false, None, 1, &section[4..]);
        rest.kind = PidKind::Section;

        let mut buffer = PidBuffer::new(0, PidKind::Section, 64, 64);
        buffer.push(&start);
        assert!(buffer.is_empty());
        buffer.push(&rest);
        assert_eq!(buffer.take_section().as_deref(), Some(&section[..]));
        assert!(buffer.take_section().is_none());
    }

    #[test]
    fn test_section_pid_keeps_packed_sections() {
        let first = [0x02, 0xB0, 0x05, 0x00, 0x01, 0xC1, 0x00, 0x00];
        let second = [0x02, 0xB0, 0x05, 0x00, 0x02, 0xC1, 0x00, 0x00];
        let mut data = vec![0x00];
        data.extend_from_slice(&first);
        data.extend_from_slice(&second);
        data.extend_from_slice(&[0xFF; 8]);
        let mut packed = payload(true, None, 0, &data);
        packed.kind = PidKind::Section;

        let mut buffer = PidBuffer::new(0x20, PidKind::Section, 64, 64);
        buffer.push(&packed);
        assert_eq!(buffer.take_section().as_deref(), Some(&first[..]));
        assert_eq!(buffer.take_section().as_deref(), Some(&second[..]));
        assert!(buffer.is_empty());
    }
}
