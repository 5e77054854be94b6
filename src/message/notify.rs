//! Notify messages and their event records.
//!
//! A notify message carries a list of events, each an `i32` tag followed by a
//! tag-specific body. The set of tags is closed; anything else fails with
//! `UnknownEventType`.

use bytes::{Buf, BytesMut};

use super::{DecodeContext, Message, MessageHeader};
use crate::core::stream::{StreamRead, StreamWrite};
use crate::core::uoid::{read_key, write_key};
use crate::core::Uoid;
use crate::error::{ProtocolError, Result};

/// Event tags.
pub mod event_type {
    pub const COLLISION: i32 = 1;
    pub const PICKED: i32 = 2;
    pub const VARIABLE: i32 = 4;
    pub const FACING: i32 = 5;
    pub const CONTAINED: i32 = 6;
    pub const ACTIVATE: i32 = 7;
    pub const CALLBACK: i32 = 8;
    pub const RESPONDER_STATE: i32 = 9;
    pub const MULTI_STAGE: i32 = 10;
    pub const SPAWNED: i32 = 11;
    pub const COOP: i32 = 13;
    pub const OFFER_LINKING_BOOK: i32 = 14;
}

/// Wire type codes of a variable event value.
pub mod variable_type {
    pub const NUMBER: i32 = 1;
    pub const KEY: i32 = 2;
    pub const INT: i32 = 3;
    pub const NULL: i32 = 4;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyMsg {
    pub header: MessageHeader,
    pub notify_type: i32,
    pub state: f32,
    pub id: i32,
    pub events: Vec<NotifyEvent>,
}

/// Value of a variable event. The wire form always has room for a number and a
/// key; only the combination matching the type is meaningful.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Number(f32),
    Key(Option<Uoid>),
    Int(i32),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyEvent {
    Collision {
        enter: bool,
        hitter: Option<Uoid>,
        hittee: Option<Uoid>,
    },
    Picked {
        picker: Option<Uoid>,
        picked: Option<Uoid>,
        enabled: bool,
        hit_point: [f32; 3],
    },
    Variable {
        name: String,
        value: VariableValue,
    },
    Facing {
        facer: Option<Uoid>,
        facee: Option<Uoid>,
        dot: f32,
        enabled: bool,
    },
    Contained {
        contained: Option<Uoid>,
        container: Option<Uoid>,
        entering: bool,
    },
    Activate {
        active: bool,
        activate: bool,
    },
    Callback {
        event: i32,
    },
    ResponderState {
        state: i32,
    },
    MultiStage {
        stage: i32,
        event: i32,
        avatar: Option<Uoid>,
    },
    Spawned {
        spawner: Option<Uoid>,
        spawnee: Option<Uoid>,
    },
    Coop {
        id: u32,
        serial: u16,
    },
    OfferLinkingBook {
        offerer: Option<Uoid>,
        target_age: i32,
        offeree: i32,
    },
}

impl VariableValue {
    fn type_code(&self) -> i32 {
        match self {
            VariableValue::Number(_) => variable_type::NUMBER,
            VariableValue::Key(_) => variable_type::KEY,
            VariableValue::Int(_) => variable_type::INT,
            VariableValue::Null => variable_type::NULL,
        }
    }

    fn read(buf: &mut dyn Buf) -> Result<Self> {
        let type_code = buf.read_i32()?;
        let number = buf.read_array::<4>()?;
        let key = read_key(buf)?;

        let invalid = |reason: &str| ProtocolError::InvalidField {
            field: "variable event",
            reason: reason.to_string(),
        };
        let value = match type_code {
            variable_type::NUMBER | variable_type::INT if key.is_some() => {
                return Err(invalid("numeric value carries a key"))
            }
            variable_type::KEY | variable_type::NULL if number != [0; 4] => {
                return Err(invalid("non-numeric value carries a number"))
            }
            variable_type::NULL if key.is_some() => return Err(invalid("null value carries a key")),
            variable_type::NUMBER => VariableValue::Number(f32::from_le_bytes(number)),
            variable_type::INT => VariableValue::Int(i32::from_le_bytes(number)),
            variable_type::KEY => VariableValue::Key(key),
            variable_type::NULL => VariableValue::Null,
            other => return Err(invalid(&format!("unknown value type {other}"))),
        };
        Ok(value)
    }

    /// The number and key slots are derived from the value alone.
    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        buf.write_i32(self.type_code());
        let (number, key) = match self {
            VariableValue::Number(n) => (n.to_le_bytes(), None),
            VariableValue::Int(i) => (i.to_le_bytes(), None),
            VariableValue::Key(k) => ([0; 4], k.as_ref()),
            VariableValue::Null => ([0; 4], None),
        };
        buf.write_bytes(&number);
        write_key(buf, key)
    }
}

impl NotifyEvent {
    pub fn event_type(&self) -> i32 {
        match self {
            NotifyEvent::Collision { .. } => event_type::COLLISION,
            NotifyEvent::Picked { .. } => event_type::PICKED,
            NotifyEvent::Variable { .. } => event_type::VARIABLE,
            NotifyEvent::Facing { .. } => event_type::FACING,
            NotifyEvent::Contained { .. } => event_type::CONTAINED,
            NotifyEvent::Activate { .. } => event_type::ACTIVATE,
            NotifyEvent::Callback { .. } => event_type::CALLBACK,
            NotifyEvent::ResponderState { .. } => event_type::RESPONDER_STATE,
            NotifyEvent::MultiStage { .. } => event_type::MULTI_STAGE,
            NotifyEvent::Spawned { .. } => event_type::SPAWNED,
            NotifyEvent::Coop { .. } => event_type::COOP,
            NotifyEvent::OfferLinkingBook { .. } => event_type::OFFER_LINKING_BOOK,
        }
    }

    pub fn read(buf: &mut dyn Buf) -> Result<Self> {
        let event = match buf.read_i32()? {
            event_type::COLLISION => NotifyEvent::Collision {
                enter: buf.read_bool()?,
                hitter: read_key(buf)?,
                hittee: read_key(buf)?,
            },
            event_type::PICKED => NotifyEvent::Picked {
                picker: read_key(buf)?,
                picked: read_key(buf)?,
                enabled: buf.read_bool()?,
                hit_point: [buf.read_f32()?, buf.read_f32()?, buf.read_f32()?],
            },
            event_type::VARIABLE => NotifyEvent::Variable {
                name: buf.read_safe_string()?,
                value: VariableValue::read(buf)?,
            },
            event_type::FACING => NotifyEvent::Facing {
                facer: read_key(buf)?,
                facee: read_key(buf)?,
                dot: buf.read_f32()?,
                enabled: buf.read_bool()?,
            },
            event_type::CONTAINED => NotifyEvent::Contained {
                contained: read_key(buf)?,
                container: read_key(buf)?,
                entering: buf.read_bool()?,
            },
            event_type::ACTIVATE => NotifyEvent::Activate {
                active: buf.read_bool()?,
                activate: buf.read_bool()?,
            },
            event_type::CALLBACK => NotifyEvent::Callback {
                event: buf.read_i32()?,
            },
            event_type::RESPONDER_STATE => NotifyEvent::ResponderState {
                state: buf.read_i32()?,
            },
            event_type::MULTI_STAGE => NotifyEvent::MultiStage {
                stage: buf.read_i32()?,
                event: buf.read_i32()?,
                avatar: read_key(buf)?,
            },
            event_type::SPAWNED => NotifyEvent::Spawned {
                spawner: read_key(buf)?,
                spawnee: read_key(buf)?,
            },
            event_type::COOP => NotifyEvent::Coop {
                id: buf.read_u32()?,
                serial: buf.read_u16()?,
            },
            event_type::OFFER_LINKING_BOOK => NotifyEvent::OfferLinkingBook {
                offerer: read_key(buf)?,
                target_age: buf.read_i32()?,
                offeree: buf.read_i32()?,
            },
            other => return Err(ProtocolError::UnknownEventType(other)),
        };
        Ok(event)
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        buf.write_i32(self.event_type());
        match self {
            NotifyEvent::Collision { enter, hitter, hittee } => {
                buf.write_bool(*enter);
                write_key(buf, hitter.as_ref())?;
                write_key(buf, hittee.as_ref())?;
            }
            NotifyEvent::Picked {
                picker,
                picked,
                enabled,
                hit_point,
            } => {
                write_key(buf, picker.as_ref())?;
                write_key(buf, picked.as_ref())?;
                buf.write_bool(*enabled);
                for coord in hit_point {
                    buf.write_f32(*coord);
                }
            }
            NotifyEvent::Variable { name, value } => {
                buf.write_safe_string(name)?;
                value.write(buf)?;
            }
            NotifyEvent::Facing {
                facer,
                facee,
                dot,
                enabled,
            } => {
                write_key(buf, facer.as_ref())?;
                write_key(buf, facee.as_ref())?;
                buf.write_f32(*dot);
                buf.write_bool(*enabled);
            }
            NotifyEvent::Contained {
                contained,
                container,
                entering,
            } => {
                write_key(buf, contained.as_ref())?;
                write_key(buf, container.as_ref())?;
                buf.write_bool(*entering);
            }
            NotifyEvent::Activate { active, activate } => {
                buf.write_bool(*active);
                buf.write_bool(*activate);
            }
            NotifyEvent::Callback { event } => buf.write_i32(*event),
            NotifyEvent::ResponderState { state } => buf.write_i32(*state),
            NotifyEvent::MultiStage { stage, event, avatar } => {
                buf.write_i32(*stage);
                buf.write_i32(*event);
                write_key(buf, avatar.as_ref())?;
            }
            NotifyEvent::Spawned { spawner, spawnee } => {
                write_key(buf, spawner.as_ref())?;
                write_key(buf, spawnee.as_ref())?;
            }
            NotifyEvent::Coop { id, serial } => {
                buf.write_u32(*id);
                buf.write_u16(*serial);
            }
            NotifyEvent::OfferLinkingBook {
                offerer,
                target_age,
                offeree,
            } => {
                write_key(buf, offerer.as_ref())?;
                buf.write_i32(*target_age);
                buf.write_i32(*offeree);
            }
        }
        Ok(())
    }
}

impl NotifyMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        buf.write_i32(self.notify_type);
        buf.write_f32(self.state);
        buf.write_i32(self.id);
        buf.write_u32(self.events.len() as u32);
        for event in &self.events {
            event.write(buf)?;
        }
        Ok(())
    }
}

pub(super) fn decode(_: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    let header = MessageHeader::read(buf)?;
    let notify_type = buf.read_i32()?;
    let state = buf.read_f32()?;
    let id = buf.read_i32()?;
    let count = buf.read_u32()? as usize;
    // every event starts with its tag
    buf.ensure(count.saturating_mul(4))?;
    let events = (0..count)
        .map(|_| NotifyEvent::read(buf))
        .collect::<Result<Vec<_>>>()?;

    Ok(Message::Notify(NotifyMsg {
        header,
        notify_type,
        state,
        id,
        events,
    }))
}
