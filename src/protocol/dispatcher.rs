use crate::error::{ProtocolError, Result};
use crate::protocol::connect::ConnectionRole;
use crate::protocol::connection::Connection;
use futures::future::BoxFuture;
use std::collections::HashMap;

/// A message handler. It owns reading its message body from the connection.
pub type HandlerFn = for<'a> fn(&'a mut Connection) -> BoxFuture<'a, Result<()>>;

#[derive(Clone, Copy)]
pub struct Handler {
    pub name: &'static str,
    pub call: HandlerFn,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// Static message-type table for one connection role.
///
/// Tables are filled once at startup; a message type registered twice is a
/// startup error.
#[derive(Debug)]
pub struct Dispatcher {
    role: ConnectionRole,
    handlers: HashMap<u16, Handler>,
}

impl Dispatcher {
    pub fn new(role: ConnectionRole) -> Self {
        Self {
            role,
            handlers: HashMap::new(),
        }
    }

    /// The built-in table for `role`.
    pub fn for_role(role: ConnectionRole) -> Result<Self> {
        let mut dispatcher = Self::new(role);
        let table = match role {
            ConnectionRole::Auth => crate::protocol::auth::HANDLERS,
            ConnectionRole::Game => crate::protocol::game::HANDLERS,
            ConnectionRole::GateKeeper => crate::protocol::gatekeeper::HANDLERS,
        };
        for &(message_type, name, call) in table {
            dispatcher.register(message_type, name, call)?;
        }
        Ok(dispatcher)
    }

    pub fn register(&mut self, message_type: u16, name: &'static str, call: HandlerFn) -> Result<()> {
        if self.handlers.contains_key(&message_type) {
            return Err(ProtocolError::DuplicateHandler(message_type));
        }
        self.handlers.insert(message_type, Handler { name, call });
        Ok(())
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// The handler registered for `message_type`, copied out of the table.
    pub fn get(&self, message_type: u16) -> Option<Handler> {
        self.handlers.get(&message_type).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
