//! Gatekeeper role: hands out the file and auth server addresses.

use bytes::BytesMut;
use futures::future::BoxFuture;
use tracing::debug;

use crate::core::stream::{truncate_utf16, StreamWrite};
use crate::error::Result;
use crate::protocol::auth::echo_ping;
use crate::protocol::connection::Connection;
use crate::protocol::dispatcher::HandlerFn;

pub mod cli2gatekeeper {
    pub const PING_REQUEST: u16 = 0;
    pub const FILE_SRV_INFO_REQUEST: u16 = 1;
    pub const AUTH_SRV_INFO_REQUEST: u16 = 2;
}

pub mod gatekeeper2cli {
    pub const PING_REPLY: u16 = 0;
    pub const FILE_SRV_INFO_REPLY: u16 = 1;
    pub const AUTH_SRV_INFO_REPLY: u16 = 2;
}

/// Address fields are fixed 24-unit buffers in the client.
pub const ADDRESS_MAX_UNITS: usize = 24;

pub const HANDLERS: &[(u16, &str, HandlerFn)] = &[
    (cli2gatekeeper::PING_REQUEST, "gatekeeper ping", ping as HandlerFn),
    (cli2gatekeeper::FILE_SRV_INFO_REQUEST, "file server info", file_server_info as HandlerFn),
    (cli2gatekeeper::AUTH_SRV_INFO_REQUEST, "auth server info", auth_server_info as HandlerFn),
];

fn ping(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(echo_ping(conn, gatekeeper2cli::PING_REPLY))
}

async fn send_address(conn: &mut Connection, reply_type: u16, trans_id: u32, address: &str) -> Result<()> {
    let address = truncate_utf16(address, ADDRESS_MAX_UNITS);
    let mut reply = BytesMut::with_capacity(8 + address.len() * 2);
    reply.write_u16(reply_type);
    reply.write_u32(trans_id);
    reply.write_string16(&address, ADDRESS_MAX_UNITS)?;
    conn.send(&reply).await
}

fn file_server_info(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let trans_id = conn.read_u32().await?;
        let is_patcher = conn.read_u8().await? != 0;
        debug!(trans_id, is_patcher, "File server address requested");

        let address = conn.server().config().shard.file_server_address.clone();
        send_address(conn, gatekeeper2cli::FILE_SRV_INFO_REPLY, trans_id, &address).await
    })
}

fn auth_server_info(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let trans_id = conn.read_u32().await?;
        debug!(trans_id, "Auth server address requested");

        let address = conn.server().config().shard.auth_server_address.clone();
        send_address(conn, gatekeeper2cli::AUTH_SRV_INFO_REPLY, trans_id, &address).await
    })
}
