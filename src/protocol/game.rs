//! Game role messages.
//!
//! Propagated message buffers are decoded only for logging. A buffer that does
//! not decode is reported and dropped; the connection stays up because the
//! length prefix keeps the stream in sync.

use bytes::BytesMut;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::accounts::net_error;
use crate::core::stream::StreamWrite;
use crate::error::{ProtocolError, Result};
use crate::message::read_creatable;
use crate::protocol::connection::Connection;
use crate::protocol::dispatcher::HandlerFn;

pub mod cli2game {
    pub const PING_REQUEST: u16 = 0;
    pub const JOIN_AGE_REQUEST: u16 = 1;
    pub const PROPAGATE_BUFFER: u16 = 2;
}

pub mod game2cli {
    pub const PING_REPLY: u16 = 0;
    pub const JOIN_AGE_REPLY: u16 = 1;
}

pub const HANDLERS: &[(u16, &str, HandlerFn)] = &[
    (cli2game::PING_REQUEST, "game ping", ping as HandlerFn),
    (cli2game::JOIN_AGE_REQUEST, "join age", join_age as HandlerFn),
    (cli2game::PROPAGATE_BUFFER, "propagate buffer", propagate_buffer as HandlerFn),
];

fn ping(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let ping_time = conn.read_u32().await?;
        let mut reply = BytesMut::with_capacity(6);
        reply.write_u16(game2cli::PING_REPLY);
        reply.write_u32(ping_time);
        conn.send(&reply).await
    })
}

fn join_age(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let trans_id = conn.read_u32().await?;
        let age_mcp_id = conn.read_u32().await?;
        let account_id = conn.read_uuid().await?;
        let ki_number = conn.read_u32().await?;

        let session = conn.game_session_mut()?;
        if session.account_id != account_id {
            warn!(
                connected_as = %session.account_id,
                joining_as = %account_id,
                "Join age account differs from the connect data"
            );
        }
        session.age_mcp_id = Some(age_mcp_id);
        session.ki_number = Some(ki_number);
        info!(age_mcp_id, ki_number, age_instance_id = %session.age_instance_id, "Joined age");
        conn.refresh_registry()?;

        let mut reply = BytesMut::with_capacity(10);
        reply.write_u16(game2cli::JOIN_AGE_REPLY);
        reply.write_u32(trans_id);
        reply.write_u32(net_error::SUCCESS);
        conn.send(&reply).await
    })
}

fn propagate_buffer(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let declared_class = conn.read_u32().await?;
        let len = conn.read_u32().await? as usize;

        let max = conn.server().config().server.max_propagate_buffer;
        if len > max {
            return Err(ProtocolError::BadLength {
                field: "propagate buffer",
                expected: max,
                actual: len,
            });
        }
        let mut buffer = conn.read_fixed(len).await?;

        match read_creatable(conn.server().messages(), &mut buffer) {
            Ok(Some(message)) => {
                if u32::from(message.class_index()) != declared_class {
                    warn!(
                        declared_class,
                        decoded_class = message.class_index(),
                        "Propagated message class differs from its declared class"
                    );
                }
                debug!(
                    message = message.name(),
                    receivers = message.header().receivers.len(),
                    trailing = buffer.len(),
                    "Propagated message"
                );
            }
            Ok(None) => debug!(declared_class, "Propagated an empty message slot"),
            Err(e) => warn!(declared_class, len, error = %e, "Propagated message could not be decoded"),
        }
        Ok(())
    })
}
