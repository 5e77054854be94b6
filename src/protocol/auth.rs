//! Auth role messages.
//!
//! | in | body | out |
//! |---|---|---|
//! | 0 ping | `u32 time, u32 trans, u32 len, bytes` | 0 echo |
//! | 1 client register | `u32 build_id` | 3 `u32 server_challenge` |
//! | 3 account login | `u32 trans, u32 client_challenge, string16 account, [u8; 20] hash, string16 token, string16 os` | 6 per avatar, then 4 |
//! | 6 set player | `u32 trans, u32 ki` | 7 `u32 trans, u32 result` |

use bytes::BytesMut;
use futures::future::BoxFuture;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::net_error;
use crate::core::stream::StreamWrite;
use crate::crypto::DIGEST_LEN;
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::Connection;
use crate::protocol::dispatcher::HandlerFn;
use crate::utils::metrics::global_metrics;

pub mod cli2auth {
    pub const PING_REQUEST: u16 = 0;
    pub const CLIENT_REGISTER_REQUEST: u16 = 1;
    pub const ACCT_LOGIN_REQUEST: u16 = 3;
    pub const ACCT_SET_PLAYER_REQUEST: u16 = 6;
}

pub mod auth2cli {
    pub const PING_REPLY: u16 = 0;
    pub const CLIENT_REGISTER_REPLY: u16 = 3;
    pub const ACCT_LOGIN_REPLY: u16 = 4;
    pub const ACCT_PLAYER_INFO: u16 = 6;
    pub const ACCT_SET_PLAYER_REPLY: u16 = 7;
}

/// Longest account name accepted at login.
pub const ACCOUNT_NAME_MAX: usize = 64;
pub const AUTH_TOKEN_MAX: usize = 64;
pub const OS_NAME_MAX: usize = 8;
/// Avatar names are fixed 40-unit fields in the client.
pub const PLAYER_NAME_MAX: usize = 40;
pub const AVATAR_SHAPE_MAX: usize = 64;

pub const HANDLERS: &[(u16, &str, HandlerFn)] = &[
    (cli2auth::PING_REQUEST, "auth ping", ping as HandlerFn),
    (cli2auth::CLIENT_REGISTER_REQUEST, "client register", client_register as HandlerFn),
    (cli2auth::ACCT_LOGIN_REQUEST, "account login", account_login as HandlerFn),
    (cli2auth::ACCT_SET_PLAYER_REQUEST, "set player", set_player as HandlerFn),
];

/// Ping shared by the auth and gatekeeper roles: the body is echoed back.
pub(crate) async fn echo_ping(conn: &mut Connection, reply_type: u16) -> Result<()> {
    let ping_time = conn.read_u32().await?;
    let trans_id = conn.read_u32().await?;
    let len = conn.read_u32().await? as usize;

    let max = conn.server().config().server.max_ping_payload;
    if len > max {
        return Err(ProtocolError::BadLength {
            field: "ping payload",
            expected: max,
            actual: len,
        });
    }
    let payload = conn.read_fixed(len).await?;

    let mut reply = BytesMut::with_capacity(14 + len);
    reply.write_u16(reply_type);
    reply.write_u32(ping_time);
    reply.write_u32(trans_id);
    reply.write_u32(len as u32);
    reply.write_bytes(&payload);
    conn.send(&reply).await
}

fn ping(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(echo_ping(conn, auth2cli::PING_REPLY))
}

fn client_register(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let build_id = conn.read_u32().await?;
        let expected = conn.server().config().shard.expected_build_id;
        if build_id != expected {
            warn!(build_id, expected, "Client registered with an unexpected build");
        }

        let challenge: u32 = rand::random();
        conn.auth_session_mut()?.server_challenge = Some(challenge);

        let mut reply = BytesMut::with_capacity(6);
        reply.write_u16(auth2cli::CLIENT_REGISTER_REPLY);
        reply.write_u32(challenge);
        conn.send(&reply).await
    })
}

fn login_reply(trans_id: u32, result: u32, account_id: Uuid, flags: u32, billing: u32) -> BytesMut {
    let mut reply = BytesMut::with_capacity(2 + 4 * 5 + 16 + 16);
    reply.write_u16(auth2cli::ACCT_LOGIN_REPLY);
    reply.write_u32(trans_id);
    reply.write_u32(result);
    reply.write_uuid(&account_id);
    reply.write_u32(flags);
    reply.write_u32(billing);
    // encryption key, unused without encryption
    for _ in 0..4 {
        reply.write_u32(0);
    }
    reply
}

fn account_login(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let trans_id = conn.read_u32().await?;
        let client_challenge = conn.read_u32().await?;
        let account_name = conn.read_string16(ACCOUNT_NAME_MAX).await?;
        let mut hash = [0u8; DIGEST_LEN];
        conn.read_exact(&mut hash).await?;
        let _auth_token = conn.read_string16(AUTH_TOKEN_MAX).await?;
        let os = conn.read_string16(OS_NAME_MAX).await?;

        let server_challenge = conn.auth_session()?.server_challenge;
        let account = conn.server().accounts().find(&account_name);

        let verified = match (&account, server_challenge) {
            (Some(account), Some(server_challenge)) => account.verify_login(client_challenge, server_challenge, &hash),
            (Some(_), None) => {
                warn!(account = %account_name, "Login before client registration");
                false
            }
            (None, _) => false,
        };
        global_metrics().login(verified);

        let account = match account {
            Some(account) if verified => account,
            _ => {
                warn!(account = %account_name, "Login failed");
                let reply = login_reply(trans_id, net_error::AUTHENTICATION_FAILED, Uuid::nil(), 0, 0);
                return conn.send(&reply).await;
            }
        };

        for player in &account.players {
            let mut info = BytesMut::new();
            info.write_u16(auth2cli::ACCT_PLAYER_INFO);
            info.write_u32(trans_id);
            info.write_u32(player.ki_number);
            info.write_string16(&player.name, PLAYER_NAME_MAX)?;
            info.write_string16(&player.avatar_shape, AVATAR_SHAPE_MAX)?;
            info.write_u32(player.explorer);
            conn.send(&info).await?;
        }

        let reply = login_reply(
            trans_id,
            net_error::SUCCESS,
            account.id,
            account.flags,
            account.billing_type,
        );
        info!(account = %account.name, account_id = %account.id, os = %os, "Login succeeded");
        conn.auth_session_mut()?.account = Some(account);
        conn.refresh_registry()?;
        conn.send(&reply).await
    })
}

fn set_player(conn: &mut Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let trans_id = conn.read_u32().await?;
        let ki_number = conn.read_u32().await?;

        let session = conn.auth_session_mut()?;
        let result = match &session.account {
            None => net_error::AUTHENTICATION_FAILED,
            Some(account) if account.player(ki_number).is_none() => net_error::PLAYER_NOT_FOUND,
            Some(_) => {
                session.player = Some(ki_number);
                net_error::SUCCESS
            }
        };
        if result == net_error::SUCCESS {
            info!(ki_number, "Player selected");
            conn.refresh_registry()?;
        } else {
            warn!(ki_number, result, "Set player refused");
        }

        let mut reply = BytesMut::with_capacity(10);
        reply.write_u16(auth2cli::ACCT_SET_PLAYER_REPLY);
        reply.write_u32(trans_id);
        reply.write_u32(result);
        conn.send(&reply).await
    })
}
