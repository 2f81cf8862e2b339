//! The 12-byte wire header (§3 "Header layout", §4.1).
//!
//! [`HeaderView`] reads straight out of the underlying buffer on every call
//! instead of caching parsed fields, so inspecting a header for routing or
//! filtering never requires touching the payload. [`HeaderFields`] is the
//! encode-side counterpart: a plain struct a caller fills in before
//! [`HeaderFields::encode_into`] writes it to a fresh buffer.

use byteorder::{BigEndian, ByteOrder};
use rti_core::{Error, FederateHandle, FederationHandle, Result};

/// Length of the fixed header, in bytes.
pub const HEADER_LEN: usize = 12;

/// Largest payload length the 24-bit length field can carry.
pub const MAX_PAYLOAD_LEN: u32 = (1 << 24) - 1;

/// The RTI wire magic preceding every bundled-stream frame (§6).
pub const BUNDLE_MAGIC: u32 = 0xCAFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags {
    pub bundle: bool,
    pub encrypted: bool,
    pub authenticated: bool,
    pub manually_marshalled: bool,
    pub filtering: bool,
    pub filtering_is_object_class: bool,
}

impl HeaderFlags {
    fn to_byte(self) -> u8 {
        (self.bundle as u8)
            | (self.encrypted as u8) << 1
            | (self.authenticated as u8) << 2
            | (self.manually_marshalled as u8) << 3
            | (self.filtering as u8) << 4
            | (self.filtering_is_object_class as u8) << 5
    }

    fn from_byte(b: u8) -> Self {
        HeaderFlags {
            bundle: b & 0x01 != 0,
            encrypted: b & 0x02 != 0,
            authenticated: b & 0x04 != 0,
            manually_marshalled: b & 0x08 != 0,
            filtering: b & 0x10 != 0,
            filtering_is_object_class: b & 0x20 != 0,
        }
    }
}

/// Wire-level classification of a [`Message`](crate::message::Message) (§3 "CallType").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallType {
    DataMessage = 0,
    Notification = 1,
    ControlRequest = 2,
    ControlResponseOk = 3,
    ControlResponseErr = 4,
}

impl CallType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(CallType::DataMessage),
            1 => Ok(CallType::Notification),
            2 => Ok(CallType::ControlRequest),
            3 => Ok(CallType::ControlResponseOk),
            4 => Ok(CallType::ControlResponseErr),
            other => Err(Error::Protocol(format!("unknown CallType id {other}"))),
        }
    }

    pub fn is_response(self) -> bool {
        matches!(self, CallType::ControlResponseOk | CallType::ControlResponseErr)
    }
}

/// The fields encoded into a 12-byte header, filled in by the caller and
/// written with [`HeaderFields::encode_into`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFields {
    pub flags: HeaderFlags,
    pub payload_len: u32,
    pub call_type: CallType,
    pub federation: FederationHandle,
    pub message_type: u8,
    /// Request ID for control traffic, filtering ID for data messages (§3).
    pub request_or_filtering_id: u16,
    pub source: FederateHandle,
    pub target: FederateHandle,
}

impl HeaderFields {
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Protocol("buffer too small for header".into()));
        }
        if self.payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::Protocol(format!(
                "payload length {} exceeds 24-bit limit",
                self.payload_len
            )));
        }
        buf[0] = self.flags.to_byte();
        write_u24(&mut buf[1..4], self.payload_len);
        let fed = self.federation.to_wire4()?;
        buf[4] = ((self.call_type as u8) << 4) | (fed & 0x0F);
        buf[5] = self.message_type;
        BigEndian::write_u16(&mut buf[6..8], self.request_or_filtering_id);
        BigEndian::write_u16(&mut buf[8..10], self.source.to_wire()?);
        BigEndian::write_u16(&mut buf[10..12], self.target.to_wire()?);
        Ok(())
    }

    /// Build the response header for a control request: source and target
    /// swap, the call type becomes OK or Err, the message type is carried
    /// over from the request (§4.1 "Response encoding").
    pub fn into_response(self, ok: bool) -> Self {
        HeaderFields {
            call_type: if ok {
                CallType::ControlResponseOk
            } else {
                CallType::ControlResponseErr
            },
            source: self.target,
            target: self.source,
            ..self
        }
    }
}

fn write_u24(buf: &mut [u8], v: u32) {
    buf[0] = (v >> 16) as u8;
    buf[1] = (v >> 8) as u8;
    buf[2] = v as u8;
}

fn read_u24(buf: &[u8]) -> u32 {
    (buf[0] as u32) << 16 | (buf[1] as u32) << 8 | buf[2] as u32
}

/// A read-only, zero-copy view over an encoded header. Every accessor parses
/// directly from `buf`; nothing is cached (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct HeaderView<'a> {
    buf: &'a [u8],
}

impl<'a> HeaderView<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Protocol("buffer shorter than header".into()));
        }
        Ok(HeaderView { buf })
    }

    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_byte(self.buf[0])
    }

    pub fn payload_len(&self) -> u32 {
        read_u24(&self.buf[1..4])
    }

    pub fn call_type(&self) -> Result<CallType> {
        CallType::from_u8(self.buf[4] >> 4)
    }

    pub fn federation(&self) -> FederationHandle {
        FederationHandle::from_wire4(self.buf[4] & 0x0F)
    }

    pub fn message_type(&self) -> u8 {
        self.buf[5]
    }

    pub fn request_or_filtering_id(&self) -> u16 {
        BigEndian::read_u16(&self.buf[6..8])
    }

    pub fn source(&self) -> FederateHandle {
        FederateHandle::from_wire(BigEndian::read_u16(&self.buf[8..10]))
    }

    pub fn target(&self) -> FederateHandle {
        FederateHandle::from_wire(BigEndian::read_u16(&self.buf[10..12]))
    }

    /// Materialize every field into an owned struct, for call sites that need
    /// more than one or two fields and would otherwise re-parse repeatedly.
    pub fn to_fields(&self) -> Result<HeaderFields> {
        Ok(HeaderFields {
            flags: self.flags(),
            payload_len: self.payload_len(),
            call_type: self.call_type()?,
            federation: self.federation(),
            message_type: self.message_type(),
            request_or_filtering_id: self.request_or_filtering_id(),
            source: self.source(),
            target: self.target(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rti_core::{NULL_FEDERATE, RTI_HANDLE};

    fn sample() -> HeaderFields {
        HeaderFields {
            flags: HeaderFlags {
                bundle: false,
                encrypted: false,
                authenticated: false,
                manually_marshalled: true,
                filtering: true,
                filtering_is_object_class: false,
            },
            payload_len: 42,
            call_type: CallType::ControlRequest,
            federation: FederationHandle::from(3usize),
            message_type: 7,
            request_or_filtering_id: 1,
            source: RTI_HANDLE,
            target: RTI_HANDLE,
        }
    }

    #[test]
    fn header_round_trips() {
        let fields = sample();
        let mut buf = [0u8; HEADER_LEN];
        fields.encode_into(&mut buf).unwrap();
        let view = HeaderView::new(&buf).unwrap();
        let decoded = view.to_fields().unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn rti_probe_header_matches_scenario_s1() {
        let fields = HeaderFields {
            flags: HeaderFlags::default(),
            payload_len: 0,
            call_type: CallType::ControlRequest,
            federation: FederationHandle::from(0usize),
            message_type: 0,
            request_or_filtering_id: 1,
            source: RTI_HANDLE,
            target: RTI_HANDLE,
        };
        let mut buf = [0u8; HEADER_LEN];
        fields.encode_into(&mut buf).unwrap();
        assert_eq!(buf[0], 0x00);
        assert_eq!(read_u24(&buf[1..4]), 0);
        assert_eq!(buf[4] >> 4, CallType::ControlRequest as u8);
        assert_eq!(buf[4] & 0x0F, 0);
        assert_eq!(buf[5], 0);
        assert_eq!(BigEndian::read_u16(&buf[6..8]), 1);
        assert_eq!(FederateHandle::from_wire(BigEndian::read_u16(&buf[8..10])), RTI_HANDLE);
        assert_eq!(FederateHandle::from_wire(BigEndian::read_u16(&buf[10..12])), RTI_HANDLE);
    }

    #[test]
    fn response_header_swaps_source_and_target() {
        let req = sample();
        let resp = req.into_response(true);
        assert_eq!(resp.source, req.target);
        assert_eq!(resp.target, req.source);
        assert_eq!(resp.call_type, CallType::ControlResponseOk);
        assert_eq!(resp.message_type, req.message_type);
    }

    #[test]
    fn payload_over_limit_is_rejected() {
        let mut fields = sample();
        fields.payload_len = MAX_PAYLOAD_LEN + 1;
        let mut buf = [0u8; HEADER_LEN];
        assert!(fields.encode_into(&mut buf).is_err());
    }

    #[test]
    fn unknown_call_type_is_a_protocol_error() {
        let mut buf = [0u8; HEADER_LEN];
        buf[4] = 0xF0; // call type nibble = 15, undefined
        let view = HeaderView::new(&buf).unwrap();
        assert!(view.call_type().is_err());
    }

    #[test]
    fn null_federate_source_round_trips() {
        let mut fields = sample();
        fields.source = NULL_FEDERATE;
        let mut buf = [0u8; HEADER_LEN];
        fields.encode_into(&mut buf).unwrap();
        assert_eq!(HeaderView::new(&buf).unwrap().source(), NULL_FEDERATE);
    }

    fn arb_call_type() -> impl Strategy<Value = CallType> {
        prop_oneof![
            Just(CallType::DataMessage),
            Just(CallType::Notification),
            Just(CallType::ControlRequest),
            Just(CallType::ControlResponseOk),
            Just(CallType::ControlResponseErr),
        ]
    }

    fn arb_federate_handle() -> impl Strategy<Value = FederateHandle> {
        (0u64..=(u16::MAX as u64 - 3)).prop_map(|raw| FederateHandle::from(raw as usize))
    }

    proptest! {
        #[test]
        fn header_round_trips_for_any_field_combination(
            call_type in arb_call_type(),
            federation_raw in 0u64..16,
            message_type in any::<u8>(),
            request_or_filtering_id in any::<u16>(),
            payload_len in 0u32..=MAX_PAYLOAD_LEN,
            source in arb_federate_handle(),
            target in arb_federate_handle(),
        ) {
            let fields = HeaderFields {
                flags: HeaderFlags::default(),
                payload_len,
                call_type,
                federation: FederationHandle::from(federation_raw as usize),
                message_type,
                request_or_filtering_id,
                source,
                target,
            };
            let mut buf = [0u8; HEADER_LEN];
            fields.encode_into(&mut buf).unwrap();
            let decoded = HeaderView::new(&buf).unwrap().to_fields().unwrap();
            prop_assert_eq!(decoded, fields);
        }
    }
}
