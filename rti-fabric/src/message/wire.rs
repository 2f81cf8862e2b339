//! Encoding and decoding of the wire envelope (§4.1, §6).
//!
//! Two payload codecs coexist: the generic `bincode` serializer for most
//! message types, and a hand-written manual marshaller for `UpdateAttributes`
//! / `SendInteraction`, which dominate traffic volume on a running
//! federation.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use rti_core::{
    AttributeHandle, Error, FederateHandle, InteractionClassHandle, LogicalTime, RequestId,
    Result, Target, RTI_HANDLE, TARGET_ALL_HANDLE,
};

use super::header::{CallType, HeaderFields, HeaderFlags, HeaderView, HEADER_LEN, MAX_PAYLOAD_LEN};
use super::{MessageBody, MessageType, ObjectInstanceId, PorticoMessage};

/// An encoded message: header plus payload, ready for the transport (§3
/// "Message (wire envelope)"). Once built its buffer is never mutated.
#[derive(Debug, Clone)]
pub struct Message {
    pub call_type: CallType,
    pub request_id: RequestId,
    buf: Vec<u8>,
}

impl Message {
    pub fn encode(msg: &PorticoMessage, call_type: CallType, request_id: RequestId) -> Result<Self> {
        let message_type = msg.message_type();
        let manual = message_type.uses_manual_marshal();

        let payload = if manual {
            encode_manual(msg)?
        } else {
            bincode::serialize(msg).map_err(|e| Error::Protocol(format!("serialize failed: {e}")))?
        };
        if payload.len() as u64 > MAX_PAYLOAD_LEN as u64 {
            return Err(Error::Protocol("payload exceeds 24-bit length field".into()));
        }

        let target_handle = match &msg.target {
            Target::One(h) => *h,
            Target::All => TARGET_ALL_HANDLE,
            Target::Many(_) => {
                return Err(Error::Protocol(
                    "multi-target delivery must be expanded to one message per recipient before encoding".into(),
                ))
            }
        };

        let fields = HeaderFields {
            flags: HeaderFlags {
                bundle: false,
                encrypted: false,
                authenticated: false,
                manually_marshalled: manual,
                filtering: call_type == CallType::DataMessage,
                filtering_is_object_class: matches!(msg.body, MessageBody::UpdateAttributes { .. }),
            },
            payload_len: payload.len() as u32,
            call_type,
            federation: msg.federation,
            message_type: message_type as u8,
            request_or_filtering_id: request_id.0,
            source: msg.source,
            target: target_handle,
        };

        let mut buf = vec![0u8; HEADER_LEN + payload.len()];
        fields.encode_into(&mut buf[..HEADER_LEN])?;
        buf[HEADER_LEN..].copy_from_slice(&payload);
        Ok(Message { call_type, request_id, buf })
    }

    /// Build the response to a previously decoded request, re-using its
    /// buffer and flipping source/target in place (§4.1, §4.4).
    pub fn encode_response(request_header: &HeaderView<'_>, body: &PorticoMessage, ok: bool) -> Result<Self> {
        let request_fields = request_header.to_fields()?;
        let response_fields = request_fields.into_response(ok);
        let manual = response_fields.flags.manually_marshalled;
        let payload = if manual {
            encode_manual(body)?
        } else {
            bincode::serialize(body).map_err(|e| Error::Protocol(format!("serialize failed: {e}")))?
        };
        let mut fields = response_fields;
        fields.payload_len = payload.len() as u32;
        let mut buf = vec![0u8; HEADER_LEN + payload.len()];
        fields.encode_into(&mut buf[..HEADER_LEN])?;
        buf[HEADER_LEN..].copy_from_slice(&payload);
        Ok(Message {
            call_type: fields.call_type,
            request_id: RequestId(fields.request_or_filtering_id),
            buf,
        })
    }

    /// Parse only the header, leaving the payload undecoded (§4.3): a
    /// protocol stack's `up`/`down` steps operate on the wire envelope and
    /// never need the body deserialized until the application connector
    /// calls [`Message::decode`] on the fully-processed result.
    pub fn from_encoded(buf: Vec<u8>) -> Result<Self> {
        let view = HeaderView::new(&buf)?;
        let fields = view.to_fields()?;
        let payload_end = HEADER_LEN
            .checked_add(fields.payload_len as usize)
            .ok_or_else(|| Error::Protocol("payload length overflow".into()))?;
        if buf.len() < payload_end {
            return Err(Error::Protocol("buffer shorter than header + payload length".into()));
        }
        Ok(Message {
            call_type: fields.call_type,
            request_id: RequestId(fields.request_or_filtering_id),
            buf,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn header(&self) -> HeaderView<'_> {
        HeaderView::new(&self.buf).expect("Message invariant: buffer always starts with a valid header")
    }

    /// Decode a full `header + payload` buffer into its typed message and
    /// envelope. The buffer's length must equal `12 + payloadLen` (§3 invariant).
    pub fn decode(buf: Vec<u8>) -> Result<(PorticoMessage, Message)> {
        let view = HeaderView::new(&buf)?;
        let fields = view.to_fields()?;
        let payload_end = HEADER_LEN
            .checked_add(fields.payload_len as usize)
            .ok_or_else(|| Error::Protocol("payload length overflow".into()))?;
        if buf.len() < payload_end {
            return Err(Error::Protocol("buffer shorter than header + payload length".into()));
        }
        let payload = &buf[HEADER_LEN..payload_end];

        let (body, timestamp, from_rti, immediate_processing) = if fields.flags.manually_marshalled {
            decode_manual(payload, MessageType::from_u8(fields.message_type)?)?
        } else {
            let body: PorticoMessage = bincode::deserialize(payload)
                .map_err(|e| Error::Protocol(format!("deserialize failed: {e}")))?;
            (body.body, body.timestamp, body.from_rti, body.immediate_processing)
        };

        let target = if fields.target == TARGET_ALL_HANDLE {
            Target::All
        } else {
            Target::One(fields.target)
        };

        let msg = PorticoMessage {
            source: fields.source,
            target,
            federation: fields.federation,
            from_rti,
            immediate_processing,
            timestamp,
            body,
        };

        let call_type = fields.call_type;
        let request_id = RequestId(fields.request_or_filtering_id);
        Ok((msg, Message { call_type, request_id, buf }))
    }
}

fn encode_manual(msg: &PorticoMessage) -> Result<Vec<u8>> {
    let message_type = msg.message_type();
    let mut buf = Vec::with_capacity(64);
    buf.push(1u8); // "manual" flag, always true for this path (§4.1)
    buf.extend_from_slice(&(message_type as u16).to_be_bytes());
    buf.extend_from_slice(&msg.timestamp.as_f64().to_be_bytes());
    buf.push(msg.from_rti as u8);
    buf.push(msg.immediate_processing as u8);
    match &msg.body {
        MessageBody::UpdateAttributes { object_id, attributes } => {
            buf.extend_from_slice(&object_id.0.to_be_bytes());
            encode_handle_value_pairs(&mut buf, attributes);
        }
        MessageBody::SendInteraction { interaction_class, parameters } => {
            buf.extend_from_slice(&interaction_class.raw().to_be_bytes());
            encode_handle_value_pairs(&mut buf, parameters);
        }
        _ => {
            return Err(Error::Protocol(
                "message type does not support manual marshal".into(),
            ))
        }
    }
    Ok(buf)
}

fn encode_handle_value_pairs(buf: &mut Vec<u8>, pairs: &[(AttributeHandle, Vec<u8>)]) {
    buf.extend_from_slice(&(pairs.len() as u16).to_be_bytes());
    for (handle, value) in pairs {
        buf.extend_from_slice(&handle.raw().to_be_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        buf.extend_from_slice(value);
    }
}

fn decode_manual(
    payload: &[u8],
    expected_type: MessageType,
) -> Result<(MessageBody, LogicalTime, bool, bool)> {
    let mut cur = Cursor::new(payload);
    let manual_flag = cur
        .read_u8()
        .map_err(|_| Error::Protocol("truncated manual marshal payload".into()))?;
    if manual_flag != 1 {
        return Err(Error::Protocol("manual marshal flag not set".into()));
    }
    let type_id = cur
        .read_u16::<BigEndian>()
        .map_err(|_| Error::Protocol("truncated manual marshal payload".into()))?;
    if type_id != expected_type as u16 {
        return Err(Error::Protocol(
            "manual marshal message type id does not match header".into(),
        ));
    }
    let timestamp = LogicalTime::new(
        cur.read_f64::<BigEndian>()
            .map_err(|_| Error::Protocol("truncated manual marshal payload".into()))?,
    );
    let from_rti = cur
        .read_u8()
        .map_err(|_| Error::Protocol("truncated manual marshal payload".into()))?
        != 0;
    let immediate_processing = cur
        .read_u8()
        .map_err(|_| Error::Protocol("truncated manual marshal payload".into()))?
        != 0;

    let body = match expected_type {
        MessageType::UpdateAttributes => {
            let object_id = ObjectInstanceId(
                cur.read_i32::<BigEndian>()
                    .map_err(|_| Error::Protocol("truncated UpdateAttributes payload".into()))?,
            );
            let attributes = decode_handle_value_pairs(&mut cur)?
                .into_iter()
                .map(|(raw, value)| (AttributeHandle::from(raw as usize), value))
                .collect();
            MessageBody::UpdateAttributes { object_id, attributes }
        }
        MessageType::SendInteraction => {
            let interaction_class = InteractionClassHandle::from(
                cur.read_u64::<BigEndian>()
                    .map_err(|_| Error::Protocol("truncated SendInteraction payload".into()))?
                    as usize,
            );
            let parameters = decode_handle_value_pairs(&mut cur)?
                .into_iter()
                .map(|(raw, value)| (AttributeHandle::from(raw as usize), value))
                .collect();
            MessageBody::SendInteraction { interaction_class, parameters }
        }
        other => {
            return Err(Error::Protocol(format!(
                "message type {other:?} does not support manual marshal"
            )))
        }
    };
    Ok((body, timestamp, from_rti, immediate_processing))
}

fn decode_handle_value_pairs(cur: &mut Cursor<&[u8]>) -> Result<Vec<(u64, Vec<u8>)>> {
    let count = cur
        .read_u16::<BigEndian>()
        .map_err(|_| Error::Protocol("truncated attribute/parameter count".into()))?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let handle = cur
            .read_u64::<BigEndian>()
            .map_err(|_| Error::Protocol("truncated attribute/parameter handle".into()))?;
        let len = cur
            .read_u32::<BigEndian>()
            .map_err(|_| Error::Protocol("truncated attribute/parameter value length".into()))?
            as usize;
        let mut value = vec![0u8; len];
        cur.read_exact(&mut value)
            .map_err(|_| Error::Protocol("truncated attribute/parameter value".into()))?;
        out.push((handle, value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rti_core::FederationHandle;

    fn probe() -> PorticoMessage {
        PorticoMessage {
            source: RTI_HANDLE,
            target: Target::One(RTI_HANDLE),
            federation: FederationHandle::from(0usize),
            from_rti: false,
            immediate_processing: false,
            timestamp: LogicalTime::NULL_TIME,
            body: MessageBody::RtiProbe,
        }
    }

    #[test]
    fn rti_probe_round_trips() {
        let msg = probe();
        let encoded = Message::encode(&msg, CallType::ControlRequest, RequestId(1)).unwrap();
        let (decoded, _) = Message::decode(encoded.as_bytes().to_vec()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn update_attributes_round_trips_through_manual_marshal() {
        let msg = PorticoMessage {
            source: FederateHandle::from(1usize),
            target: Target::All,
            federation: FederationHandle::from(2usize),
            from_rti: false,
            immediate_processing: true,
            timestamp: LogicalTime::new(3.5),
            body: MessageBody::UpdateAttributes {
                object_id: ObjectInstanceId(99),
                attributes: vec![
                    (AttributeHandle::from(1usize), vec![1, 2, 3]),
                    (AttributeHandle::from(2usize), vec![]),
                ],
            },
        };
        let encoded = Message::encode(&msg, CallType::DataMessage, RequestId::NONE).unwrap();
        assert!(encoded.header().flags().manually_marshalled);
        let (decoded, _) = Message::decode(encoded.as_bytes().to_vec()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn send_interaction_round_trips_with_zero_parameters() {
        let msg = PorticoMessage {
            source: FederateHandle::from(5usize),
            target: Target::One(FederateHandle::from(6usize)),
            federation: FederationHandle::from(0usize),
            from_rti: false,
            immediate_processing: false,
            timestamp: LogicalTime::NULL_TIME,
            body: MessageBody::SendInteraction {
                interaction_class: InteractionClassHandle::from(10usize),
                parameters: vec![],
            },
        };
        let encoded = Message::encode(&msg, CallType::DataMessage, RequestId::NONE).unwrap();
        let (decoded, _) = Message::decode(encoded.as_bytes().to_vec()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn many_target_is_rejected_at_the_boundary() {
        let mut msg = probe();
        msg.target = Target::Many(vec![RTI_HANDLE, FederateHandle::from(2usize)]);
        assert!(Message::encode(&msg, CallType::ControlRequest, RequestId(1)).is_err());
    }

    #[test]
    fn generic_message_round_trips() {
        let msg = PorticoMessage {
            source: FederateHandle::from(3usize),
            target: Target::One(FederateHandle::from(4usize)),
            federation: FederationHandle::from(1usize),
            from_rti: true,
            immediate_processing: false,
            timestamp: LogicalTime::new(1.0),
            body: MessageBody::CreateFederation {
                name: "shootout".into(),
                fom_modules: vec!["base.xml".into()],
            },
        };
        let encoded = Message::encode(&msg, CallType::ControlRequest, RequestId(7)).unwrap();
        assert!(!encoded.header().flags().manually_marshalled);
        let (decoded, _) = Message::decode(encoded.as_bytes().to_vec()).unwrap();
        assert_eq!(decoded, msg);
    }
}
