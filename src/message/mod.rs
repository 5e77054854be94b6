//! # Message Codec Layer
//!
//! Game messages are polymorphic "creatables": a `u16` class index followed by
//! the class body. Every body starts with the shared [`MessageHeader`].
//!
//! ## Components
//! - **Message**: closed sum type over the supported classes
//! - **MessageRegistry**: class index to decoder table, built once at startup
//! - **Creatables**: [`read_creatable`] / [`write_creatable`], where index `0x8000`
//!   stands for an absent message
//!
//! ## Example Usage
//! ```rust
//! use bytes::BytesMut;
//! use moula_server::message::{
//!     read_creatable, write_creatable, Message, MessageHeader, MessageRegistry, ServerReplyMsg,
//! };
//!
//! let registry = MessageRegistry::builtin().unwrap();
//! let reply = Message::ServerReply(ServerReplyMsg {
//!     header: MessageHeader::default(),
//!     reply: 1,
//! });
//!
//! let mut buf = BytesMut::new();
//! write_creatable(&mut buf, Some(&reply)).unwrap();
//! let decoded = read_creatable(&registry, &mut buf.freeze()).unwrap();
//! assert_eq!(decoded, Some(reply));
//! ```

pub mod avatar;
pub mod control;
pub mod notify;

use std::collections::HashMap;

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::core::stream::{StreamRead, StreamWrite};
use crate::core::uoid::{read_key, write_key};
use crate::core::Uoid;
use crate::error::{ProtocolError, Result};

pub use avatar::{AvTaskMsg, AvatarInputStateMsg, AvatarTask, LoadAvatarMsg, LoadCloneMsg};
pub use control::{AnimCmdMsg, EnableMsg, EventCallbackMsg, ServerReplyMsg};
pub use notify::{NotifyEvent, NotifyMsg, VariableValue};

/// Class index written in place of an absent creatable.
pub const NULL_CLASS_INDEX: u16 = 0x8000;

/// Creatables nested deeper than this (callbacks, triggers) are rejected.
pub const MAX_NESTING: usize = 8;

/// Class indices of the supported message types.
pub mod class_index {
    pub const ANIM_CMD_MSG: u16 = 0x0206;
    pub const ENABLE_MSG: u16 = 0x0207;
    pub const EVENT_CALLBACK_MSG: u16 = 0x020C;
    pub const LOAD_CLONE_MSG: u16 = 0x0253;
    pub const SERVER_REPLY_MSG: u16 = 0x026F;
    pub const AV_TASK_MSG: u16 = 0x0298;
    pub const NOTIFY_MSG: u16 = 0x02ED;
    pub const AVATAR_INPUT_STATE_MSG: u16 = 0x0347;
    pub const LOAD_AVATAR_MSG: u16 = 0x03B1;
}

/// Message broadcast flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BroadcastFlags(pub u32);

impl BroadcastFlags {
    pub const BY_TYPE: u32 = 0x0000_0001;
    pub const PROPAGATE_TO_CHILDREN: u32 = 0x0000_0004;
    pub const BY_EXACT_TYPE: u32 = 0x0000_0008;
    pub const PROPAGATE_TO_MODIFIERS: u32 = 0x0000_0010;
    pub const CLEAR_AFTER_BCAST: u32 = 0x0000_0020;
    pub const NET_PROPAGATE: u32 = 0x0000_0040;
    pub const NET_SENT: u32 = 0x0000_0080;
    pub const NET_USE_RELEVANCE_REGIONS: u32 = 0x0000_0100;
    pub const NET_FORCE: u32 = 0x0000_0200;
    pub const NET_NON_LOCAL: u32 = 0x0000_0400;
    pub const LOCAL_PROPAGATE: u32 = 0x0000_0800;
    pub const MSG_WATCH: u32 = 0x0000_1000;
    pub const NET_START_CASCADE: u32 = 0x0000_2000;
    pub const NET_ALLOW_INTER_AGE: u32 = 0x0000_4000;
    pub const NET_SEND_UNRELIABLE: u32 = 0x0000_8000;
    pub const CCR_SEND_TO_ALL_PLAYERS: u32 = 0x0001_0000;
    pub const NET_CREATED_REMOTELY: u32 = 0x0002_0000;

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn insert(&mut self, flag: u32) {
        self.0 |= flag;
    }
}

/// Fields shared by every message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageHeader {
    pub sender: Option<Uoid>,
    pub receivers: Vec<Option<Uoid>>,
    pub timestamp: f64,
    pub bcast_flags: BroadcastFlags,
}

impl MessageHeader {
    pub fn read(buf: &mut dyn Buf) -> Result<Self> {
        let sender = read_key(buf)?;
        let count = buf.read_u32()? as usize;
        // every key takes at least its presence byte
        buf.ensure(count)?;
        let receivers = (0..count).map(|_| read_key(buf)).collect::<Result<Vec<_>>>()?;
        let timestamp = buf.read_f64()?;
        let bcast_flags = BroadcastFlags(buf.read_u32()?);
        Ok(Self {
            sender,
            receivers,
            timestamp,
            bcast_flags,
        })
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        write_key(buf, self.sender.as_ref())?;
        buf.write_u32(self.receivers.len() as u32);
        for receiver in &self.receivers {
            write_key(buf, receiver.as_ref())?;
        }
        buf.write_f64(self.timestamp);
        buf.write_u32(self.bcast_flags.0);
        Ok(())
    }
}

/// The supported message classes.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Notify(NotifyMsg),
    AnimCmd(AnimCmdMsg),
    EventCallback(EventCallbackMsg),
    Enable(EnableMsg),
    ServerReply(ServerReplyMsg),
    LoadClone(LoadCloneMsg),
    LoadAvatar(LoadAvatarMsg),
    AvTask(AvTaskMsg),
    AvatarInputState(AvatarInputStateMsg),
}

impl Message {
    pub fn class_index(&self) -> u16 {
        match self {
            Message::Notify(_) => class_index::NOTIFY_MSG,
            Message::AnimCmd(_) => class_index::ANIM_CMD_MSG,
            Message::EventCallback(_) => class_index::EVENT_CALLBACK_MSG,
            Message::Enable(_) => class_index::ENABLE_MSG,
            Message::ServerReply(_) => class_index::SERVER_REPLY_MSG,
            Message::LoadClone(_) => class_index::LOAD_CLONE_MSG,
            Message::LoadAvatar(_) => class_index::LOAD_AVATAR_MSG,
            Message::AvTask(_) => class_index::AV_TASK_MSG,
            Message::AvatarInputState(_) => class_index::AVATAR_INPUT_STATE_MSG,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Notify(_) => "plNotifyMsg",
            Message::AnimCmd(_) => "plAnimCmdMsg",
            Message::EventCallback(_) => "plEventCallbackMsg",
            Message::Enable(_) => "plEnableMsg",
            Message::ServerReply(_) => "plServerReplyMsg",
            Message::LoadClone(_) => "plLoadCloneMsg",
            Message::LoadAvatar(_) => "plLoadAvatarMsg",
            Message::AvTask(_) => "plAvTaskMsg",
            Message::AvatarInputState(_) => "plAvatarInputStateMsg",
        }
    }

    pub fn header(&self) -> &MessageHeader {
        match self {
            Message::Notify(m) => &m.header,
            Message::AnimCmd(m) => &m.header,
            Message::EventCallback(m) => &m.header,
            Message::Enable(m) => &m.header,
            Message::ServerReply(m) => &m.header,
            Message::LoadClone(m) => &m.header,
            Message::LoadAvatar(m) => &m.base.header,
            Message::AvTask(m) => &m.header,
            Message::AvatarInputState(m) => &m.header,
        }
    }

    /// Write the body without the class index.
    pub fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Message::Notify(m) => m.write(buf),
            Message::AnimCmd(m) => m.write(buf),
            Message::EventCallback(m) => m.write(buf),
            Message::Enable(m) => m.write(buf),
            Message::ServerReply(m) => m.write(buf),
            Message::LoadClone(m) => m.write(buf),
            Message::LoadAvatar(m) => m.write(buf),
            Message::AvTask(m) => m.write(buf),
            Message::AvatarInputState(m) => m.write(buf),
        }
    }
}

/// Decoder for one class body.
pub type DecodeFn = fn(&DecodeContext<'_>, &mut dyn Buf) -> Result<Message>;

struct RegistryEntry {
    name: &'static str,
    decode: DecodeFn,
}

/// Class index to decoder table.
pub struct MessageRegistry {
    entries: HashMap<u16, RegistryEntry>,
}

impl MessageRegistry {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding every built-in message class.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        registry.register(class_index::NOTIFY_MSG, "plNotifyMsg", notify::decode)?;
        registry.register(class_index::ANIM_CMD_MSG, "plAnimCmdMsg", control::decode_anim_cmd)?;
        registry.register(
            class_index::EVENT_CALLBACK_MSG,
            "plEventCallbackMsg",
            control::decode_event_callback,
        )?;
        registry.register(class_index::ENABLE_MSG, "plEnableMsg", control::decode_enable)?;
        registry.register(
            class_index::SERVER_REPLY_MSG,
            "plServerReplyMsg",
            control::decode_server_reply,
        )?;
        registry.register(class_index::LOAD_CLONE_MSG, "plLoadCloneMsg", avatar::decode_load_clone)?;
        registry.register(
            class_index::LOAD_AVATAR_MSG,
            "plLoadAvatarMsg",
            avatar::decode_load_avatar,
        )?;
        registry.register(class_index::AV_TASK_MSG, "plAvTaskMsg", avatar::decode_av_task)?;
        registry.register(
            class_index::AVATAR_INPUT_STATE_MSG,
            "plAvatarInputStateMsg",
            avatar::decode_avatar_input_state,
        )?;
        debug!(classes = registry.len(), "message registry built");
        Ok(registry)
    }

    pub fn register(&mut self, class_index: u16, name: &'static str, decode: DecodeFn) -> Result<()> {
        if class_index == NULL_CLASS_INDEX || self.entries.contains_key(&class_index) {
            return Err(ProtocolError::DuplicateClassIndex(class_index));
        }
        self.entries.insert(class_index, RegistryEntry { name, decode });
        Ok(())
    }

    pub fn name_of(&self, class_index: u16) -> Option<&'static str> {
        self.entries.get(&class_index).map(|e| e.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a body whose class index has already been read.
    pub fn decode(&self, class_index: u16, buf: &mut dyn Buf) -> Result<Message> {
        DecodeContext::root(self).decode(class_index, buf)
    }
}

impl std::fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.entries.iter().map(|(k, e)| (*k, e.name)).collect();
        names.sort_unstable();
        f.debug_struct("MessageRegistry").field("entries", &names).finish()
    }
}

/// Registry plus the current creatable nesting depth.
pub struct DecodeContext<'r> {
    registry: &'r MessageRegistry,
    depth: usize,
}

impl<'r> DecodeContext<'r> {
    pub fn root(registry: &'r MessageRegistry) -> Self {
        Self { registry, depth: 0 }
    }

    pub fn registry(&self) -> &'r MessageRegistry {
        self.registry
    }

    fn decode(&self, class_index: u16, buf: &mut dyn Buf) -> Result<Message> {
        let entry = self
            .registry
            .entries
            .get(&class_index)
            .ok_or(ProtocolError::UnknownClassIndex(class_index))?;
        (entry.decode)(self, buf)
    }

    /// Read a creatable nested inside the message being decoded.
    pub fn read_creatable(&self, buf: &mut dyn Buf) -> Result<Option<Message>> {
        let class_index = buf.read_u16()?;
        if class_index == NULL_CLASS_INDEX {
            return Ok(None);
        }
        if self.depth >= MAX_NESTING {
            return Err(ProtocolError::InvalidField {
                field: "creatable",
                reason: format!("nesting exceeds {MAX_NESTING}"),
            });
        }
        let nested = DecodeContext {
            registry: self.registry,
            depth: self.depth + 1,
        };
        nested.decode(class_index, buf).map(Some)
    }
}

/// Read a class index and body; `0x8000` yields `None`.
pub fn read_creatable(registry: &MessageRegistry, buf: &mut dyn Buf) -> Result<Option<Message>> {
    let class_index = buf.read_u16()?;
    if class_index == NULL_CLASS_INDEX {
        return Ok(None);
    }
    registry.decode(class_index, buf).map(Some)
}

pub fn write_creatable(buf: &mut BytesMut, message: Option<&Message>) -> Result<()> {
    match message {
        Some(message) => {
            buf.write_u16(message.class_index());
            message.write_body(buf)
        }
        None => {
            buf.write_u16(NULL_CLASS_INDEX);
            Ok(())
        }
    }
}
