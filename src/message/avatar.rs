//! Clone loading and avatar messages.
//!
//! Avatar task objects are a separate class hierarchy that is not decoded here.
//! A message that carries one fails with `UnsupportedVariant` in either
//! direction.

use bytes::{Buf, BytesMut};

use super::{write_creatable, DecodeContext, Message, MessageHeader};
use crate::core::stream::{StreamRead, StreamWrite};
use crate::core::uoid::{read_key, write_key};
use crate::core::Uoid;
use crate::error::{ProtocolError, Result};

const AVATAR_TASK: &str = "avatar task";

/// Placeholder for an attached avatar task, identified by its class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvatarTask {
    pub class_index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadCloneMsg {
    pub header: MessageHeader,
    pub clone_key: Option<Uoid>,
    pub requestor: Option<Uoid>,
    pub originating_player_id: u32,
    pub user_data: u32,
    pub valid: bool,
    pub is_loading: bool,
    /// Message to deliver once the clone has loaded.
    pub trigger: Option<Box<Message>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadAvatarMsg {
    pub base: LoadCloneMsg,
    pub is_player: bool,
    pub spawn_point: Option<Uoid>,
    pub initial_task: Option<AvatarTask>,
    pub user_string: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvTaskMsg {
    pub header: MessageHeader,
    pub task: Option<AvatarTask>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvatarInputStateMsg {
    pub header: MessageHeader,
    pub state: u16,
}

fn read_task_flag(buf: &mut dyn Buf) -> Result<()> {
    if buf.read_bool()? {
        return Err(ProtocolError::UnsupportedVariant(AVATAR_TASK));
    }
    Ok(())
}

fn write_task_flag(buf: &mut BytesMut, task: Option<&AvatarTask>) -> Result<()> {
    if task.is_some() {
        return Err(ProtocolError::UnsupportedVariant(AVATAR_TASK));
    }
    buf.write_bool(false);
    Ok(())
}

impl LoadCloneMsg {
    fn read(ctx: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Self> {
        Ok(Self {
            header: MessageHeader::read(buf)?,
            clone_key: read_key(buf)?,
            requestor: read_key(buf)?,
            originating_player_id: buf.read_u32()?,
            user_data: buf.read_u32()?,
            valid: buf.read_bool()?,
            is_loading: buf.read_bool()?,
            trigger: ctx.read_creatable(buf)?.map(Box::new),
        })
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        write_key(buf, self.clone_key.as_ref())?;
        write_key(buf, self.requestor.as_ref())?;
        buf.write_u32(self.originating_player_id);
        buf.write_u32(self.user_data);
        buf.write_bool(self.valid);
        buf.write_bool(self.is_loading);
        write_creatable(buf, self.trigger.as_deref())
    }
}

pub(super) fn decode_load_clone(ctx: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    LoadCloneMsg::read(ctx, buf).map(Message::LoadClone)
}

impl LoadAvatarMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.base.write(buf)?;
        buf.write_bool(self.is_player);
        write_key(buf, self.spawn_point.as_ref())?;
        write_task_flag(buf, self.initial_task.as_ref())?;
        buf.write_safe_string(&self.user_string)
    }
}

pub(super) fn decode_load_avatar(ctx: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    let base = LoadCloneMsg::read(ctx, buf)?;
    let is_player = buf.read_bool()?;
    let spawn_point = read_key(buf)?;
    read_task_flag(buf)?;
    Ok(Message::LoadAvatar(LoadAvatarMsg {
        base,
        is_player,
        spawn_point,
        initial_task: None,
        user_string: buf.read_safe_string()?,
    }))
}

impl AvTaskMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        write_task_flag(buf, self.task.as_ref())
    }
}

pub(super) fn decode_av_task(_: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    let header = MessageHeader::read(buf)?;
    read_task_flag(buf)?;
    Ok(Message::AvTask(AvTaskMsg { header, task: None }))
}

impl AvatarInputStateMsg {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.write(buf)?;
        buf.write_u16(self.state);
        Ok(())
    }
}

pub(super) fn decode_avatar_input_state(_: &DecodeContext<'_>, buf: &mut dyn Buf) -> Result<Message> {
    Ok(Message::AvatarInputState(AvatarInputStateMsg {
        header: MessageHeader::read(buf)?,
        state: buf.read_u16()?,
    }))
}
