//! Animation, callback, enable and server-reply messages.

use bytes::{Buf, BytesMut};

use super::{write_creatable, DecodeContext, Message, MessageHeader};
use crate::core::stream::{StreamRead, StreamWrite};
use crate::core::BitVector;
use crate::error::Result;

/// Reply values carried by [`ServerReplyMsg`].
pub mod reply {
    pub const UNINIT: i32 = -1;
    pub const DENY: i32 = 0;
    pub const AFFIRM: i32 = 1;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimCmdMsg {
    pub header: MessageHeader,
    /// Messages delivered when animation events fire.
    pub callbacks: Vec<Option<Message>>,
    pub cmd: BitVector,
    pub begin: f32,
    pub end: f32,
    pub loop_end: f32,
    pub loop_begin: f32,
    pub speed: f32,
    pub speed_change_rate: f32,
    pub time: f32,
    pub anim_name: String,
    pub loop_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventCallbackMsg {
    pub header: MessageHeader,
    pub event_time: f32,
    pub event: i16,
    pub index: i16,
    pub repeats: i16,
    pub user: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnableMsg {
    pub header: MessageHeader,
    pub cmd: BitVector,
    pub types: BitVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerReplyMsg {
    pub header: MessageHeader,
    pub reply: i32,
}

impl AnimCmdMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        buf.write_u32(self.callbacks.len() as u32);
        for callback in &self.callbacks {
            write_creatable(buf, callback.as_ref())?;
        }
        self.cmd.write(buf);
        for value in [
            self.begin,
            self.end,
            self.loop_end,
            self.loop_begin,
            self.speed,
            self.speed_change_rate,
            self.time,
        ] {
            buf.write_f32(value);
        }
        buf.write_safe_string(&self.anim_name)?;
        buf.write_safe_string(&self.loop_name)
    }
}

pub(super) fn decode_anim_cmd(ctx: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    let header = MessageHeader::read(buf)?;
    let count = buf.read_u32()? as usize;
    // each callback is at least a class index
    buf.ensure(count.saturating_mul(2))?;
    let callbacks = (0..count)
        .map(|_| ctx.read_creatable(buf))
        .collect::<Result<Vec<_>>>()?;
    let cmd = BitVector::read(buf)?;

    Ok(Message::AnimCmd(AnimCmdMsg {
        header,
        callbacks,
        cmd,
        begin: buf.read_f32()?,
        end: buf.read_f32()?,
        loop_end: buf.read_f32()?,
        loop_begin: buf.read_f32()?,
        speed: buf.read_f32()?,
        speed_change_rate: buf.read_f32()?,
        time: buf.read_f32()?,
        anim_name: buf.read_safe_string()?,
        loop_name: buf.read_safe_string()?,
    }))
}

impl EventCallbackMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        buf.write_f32(self.event_time);
        buf.write_i16(self.event);
        buf.write_i16(self.index);
        buf.write_i16(self.repeats);
        buf.write_i16(self.user);
        Ok(())
    }
}

pub(super) fn decode_event_callback(_: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    Ok(Message::EventCallback(EventCallbackMsg {
        header: MessageHeader::read(buf)?,
        event_time: buf.read_f32()?,
        event: buf.read_i16()?,
        index: buf.read_i16()?,
        repeats: buf.read_i16()?,
        user: buf.read_i16()?,
    }))
}

impl EnableMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        self.cmd.write(buf);
        self.types.write(buf);
        Ok(())
    }
}

pub(super) fn decode_enable(_: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    Ok(Message::Enable(EnableMsg {
        header: MessageHeader::read(buf)?,
        cmd: BitVector::read(buf)?,
        types: BitVector::read(buf)?,
    }))
}

impl ServerReplyMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        buf.write_i32(self.reply);
        Ok(())
    }
}

pub(super) fn decode_server_reply(_: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    Ok(Message::ServerReply(ServerReplyMsg {
        header: MessageHeader::read(buf)?,
        reply: buf.read_i32()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::message::{read_creatable, MessageRegistry, MAX_NESTING};

    fn callback(event: i16) -> Message {
        Message::EventCallback(EventCallbackMsg {
            header: MessageHeader::default(),
            event_time: 0.5,
            event,
            index: 0,
            repeats: -1,
            user: 0,
        })
    }

    fn anim(callbacks: Vec<Option<Message>>) -> Message {
        let mut cmd = BitVector::new();
        cmd.set(0);
        cmd.set(15);
        Message::AnimCmd(AnimCmdMsg {
            header: MessageHeader::default(),
            callbacks,
            cmd,
            begin: 0.0,
            end: 2.5,
            loop_end: 2.5,
            loop_begin: 0.0,
            speed: 1.0,
            speed_change_rate: 0.0,
            time: 0.0,
            anim_name: "DoorOpen".into(),
            loop_name: String::new(),
        })
    }

    #[test]
    fn test_anim_cmd_with_callbacks() {
        let registry = MessageRegistry::builtin().unwrap();
        let msg = anim(vec![Some(callback(1)), None]);
        let mut buf = BytesMut::new();
        write_creatable(&mut buf, Some(&msg)).unwrap();
        let decoded = read_creatable(&registry, &mut buf.freeze()).unwrap();
        assert_eq!(decoded, Some(msg));
    }

    #[test]
    fn test_callback_nesting_bounded() {
        let registry = MessageRegistry::builtin().unwrap();
        let mut msg = callback(0);
        for _ in 0..=MAX_NESTING {
            msg = anim(vec![Some(msg)]);
        }
        let mut buf = BytesMut::new();
        write_creatable(&mut buf, Some(&msg)).unwrap();
        assert!(matches!(
            read_creatable(&registry, &mut buf.freeze()),
            Err(ProtocolError::InvalidField { field: "creatable", .. })
        ));
    }

    #[test]
    fn test_enable_bit_vectors() {
        let registry = MessageRegistry::builtin().unwrap();
        let msg = Message::Enable(EnableMsg {
            header: MessageHeader::default(),
            cmd: BitVector::from_words(vec![0x1]),
            types: BitVector::from_words(vec![0x0, 0x8000_0000]),
        });
        let mut buf = BytesMut::new();
        write_creatable(&mut buf, Some(&msg)).unwrap();
        assert_eq!(read_creatable(&registry, &mut buf.freeze()).unwrap(), Some(msg));
    }

    #[test]
    fn test_truncated_callback_body() {
        let registry = MessageRegistry::builtin().unwrap();
        let mut buf = BytesMut::new();
        write_creatable(&mut buf, Some(&callback(3))).unwrap();
        let mut short = &buf[..buf.len() - 2];
        assert!(read_creatable(&registry, &mut short).unwrap_err().is_premature_eof());
    }
}
