//! Connect packet: the first bytes a client sends.
//!
//! ```text
//! u8 role | u16 header_len (=31) | u32 build_id | u32 build_type | u32 branch_id | uuid product_id
//! ```
//!
//! followed by the role's connect data, which starts with its own `u32` length.
//! Both length fields are checked before the bytes they describe are read.

use bytes::{Buf, BytesMut};
use tracing::warn;
use uuid::Uuid;

use crate::core::stream::{StreamRead, StreamWrite, UUID_SIZE};
use crate::error::{ProtocolError, Result};

/// Declared size of the connect header, prefix included.
pub const CONNECT_HEADER_LEN: u16 = 31;

/// Role byte plus the header length field.
pub const PREFIX_LEN: usize = 3;

/// Bytes following the prefix.
pub const HEADER_TAIL_LEN: usize = CONNECT_HEADER_LEN as usize - PREFIX_LEN;

/// Connection roles served on the shared port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionRole {
    Auth = 10,
    Game = 11,
    GateKeeper = 22,
}

impl ConnectionRole {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionRole::Auth => "auth",
            ConnectionRole::Game => "game",
            ConnectionRole::GateKeeper => "gatekeeper",
        }
    }

    /// Size of the role's connect data, including its own `u32` length field.
    pub fn connect_data_len(self) -> u32 {
        match self {
            ConnectionRole::Auth | ConnectionRole::GateKeeper => 4 + UUID_SIZE as u32,
            ConnectionRole::Game => 4 + 2 * UUID_SIZE as u32,
        }
    }

    pub const ALL: [ConnectionRole; 3] = [ConnectionRole::Auth, ConnectionRole::Game, ConnectionRole::GateKeeper];
}

impl TryFrom<u8> for ConnectionRole {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            10 => Ok(ConnectionRole::Auth),
            11 => Ok(ConnectionRole::Game),
            22 => Ok(ConnectionRole::GateKeeper),
            other => Err(ProtocolError::UnsupportedConnectionType(other)),
        }
    }
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Client build flavour. Values outside the known set are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Dev,
    Qa,
    Test,
    Beta,
    Live,
    Unknown(u32),
}

impl From<u32> for BuildType {
    fn from(value: u32) -> Self {
        match value {
            10 => BuildType::Dev,
            20 => BuildType::Qa,
            30 => BuildType::Test,
            40 => BuildType::Beta,
            50 => BuildType::Live,
            other => BuildType::Unknown(other),
        }
    }
}

impl From<BuildType> for u32 {
    fn from(value: BuildType) -> Self {
        match value {
            BuildType::Dev => 10,
            BuildType::Qa => 20,
            BuildType::Test => 30,
            BuildType::Beta => 40,
            BuildType::Live => 50,
            BuildType::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectHeader {
    pub role: ConnectionRole,
    pub build_id: u32,
    pub build_type: BuildType,
    pub branch_id: u32,
    pub product_id: Uuid,
}

impl ConnectHeader {
    /// Validate the prefix. The length is checked first so a bad header never
    /// gets its tail consumed.
    pub fn check_prefix(prefix: [u8; PREFIX_LEN]) -> Result<ConnectionRole> {
        let declared = u16::from_le_bytes([prefix[1], prefix[2]]);
        if declared != CONNECT_HEADER_LEN {
            return Err(ProtocolError::BadLength {
                field: "connect header",
                expected: CONNECT_HEADER_LEN as usize,
                actual: declared as usize,
            });
        }
        ConnectionRole::try_from(prefix[0])
    }

    /// Parse the tail that follows a validated prefix.
    pub fn read_tail<B: Buf + ?Sized>(role: ConnectionRole, buf: &mut B) -> Result<Self> {
        let build_id = buf.read_u32()?;
        let build_type = BuildType::from(buf.read_u32()?);
        if let BuildType::Unknown(value) = build_type {
            warn!(build_type = value, "Unknown build type");
        }
        Ok(Self {
            role,
            build_id,
            build_type,
            branch_id: buf.read_u32()?,
            product_id: buf.read_uuid()?,
        })
    }

    /// Client-side encoding, used by tests and tooling.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.write_u8(self.role as u8);
        buf.write_u16(CONNECT_HEADER_LEN);
        buf.write_u32(self.build_id);
        buf.write_u32(self.build_type.into());
        buf.write_u32(self.branch_id);
        buf.write_uuid(&self.product_id);
    }
}

/// Role-specific connect data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleConnectData {
    Auth { token: Uuid },
    GateKeeper { token: Uuid },
    Game { account_id: Uuid, age_instance_id: Uuid },
}

impl RoleConnectData {
    /// Check a declared connect data length against the role's constant.
    pub fn check_len(role: ConnectionRole, declared: u32) -> Result<()> {
        let expected = role.connect_data_len();
        if declared != expected {
            return Err(ProtocolError::BadLength {
                field: "connect data",
                expected: expected as usize,
                actual: declared as usize,
            });
        }
        Ok(())
    }

    /// Parse the payload after its length field.
    pub fn read_payload<B: Buf + ?Sized>(role: ConnectionRole, buf: &mut B) -> Result<Self> {
        let data = match role {
            ConnectionRole::Auth => RoleConnectData::Auth { token: buf.read_uuid()? },
            ConnectionRole::GateKeeper => RoleConnectData::GateKeeper { token: buf.read_uuid()? },
            ConnectionRole::Game => RoleConnectData::Game {
                account_id: buf.read_uuid()?,
                age_instance_id: buf.read_uuid()?,
            },
        };
        if let RoleConnectData::Auth { token } | RoleConnectData::GateKeeper { token } = &data {
            if !token.is_nil() {
                warn!(role = role.name(), token = %token, "Expected a zero connect token");
            }
        }
        Ok(data)
    }

    pub fn role(&self) -> ConnectionRole {
        match self {
            RoleConnectData::Auth { .. } => ConnectionRole::Auth,
            RoleConnectData::GateKeeper { .. } => ConnectionRole::GateKeeper,
            RoleConnectData::Game { .. } => ConnectionRole::Game,
        }
    }

    /// Client-side encoding, length field included.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.write_u32(self.role().connect_data_len());
        match self {
            RoleConnectData::Auth { token } | RoleConnectData::GateKeeper { token } => buf.write_uuid(token),
            RoleConnectData::Game {
                account_id,
                age_instance_id,
            } => {
                buf.write_uuid(account_id);
                buf.write_uuid(age_instance_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(role: ConnectionRole) -> ConnectHeader {
        ConnectHeader {
            role,
            build_id: 918,
            build_type: BuildType::Live,
            branch_id: 1,
            product_id: Uuid::from_u128(0xea48_9821_6c35_4a35_bf59_6e1d_2b2c_9c8d),
        }
    }

    #[test]
    fn test_header_is_thirty_one_bytes() {
        let mut buf = BytesMut::new();
        header(ConnectionRole::Auth).encode(&mut buf);
        assert_eq!(buf.len(), CONNECT_HEADER_LEN as usize);
        assert_eq!(&buf[..3], &[10, 31, 0]);
    }

    #[test]
    fn test_header_round_trip() {
        let mut buf = BytesMut::new();
        header(ConnectionRole::Game).encode(&mut buf);
        let mut bytes = buf.freeze();
        let prefix = bytes.read_array::<PREFIX_LEN>().unwrap();
        let role = ConnectHeader::check_prefix(prefix).unwrap();
        assert_eq!(ConnectHeader::read_tail(role, &mut bytes).unwrap(), header(ConnectionRole::Game));
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_length_checked_before_role() {
        assert!(matches!(
            ConnectHeader::check_prefix([99, 30, 0]),
            Err(ProtocolError::BadLength { expected: 31, actual: 30, .. })
        ));
        assert!(matches!(
            ConnectHeader::check_prefix([99, 31, 0]),
            Err(ProtocolError::UnsupportedConnectionType(99))
        ));
    }

    #[test]
    fn test_unknown_build_type_kept() {
        assert_eq!(BuildType::from(77), BuildType::Unknown(77));
        assert_eq!(u32::from(BuildType::Unknown(77)), 77);
        assert_eq!(u32::from(BuildType::Beta), 40);
    }

    #[test]
    fn test_connect_data_lengths() {
        assert_eq!(ConnectionRole::Auth.connect_data_len(), 20);
        assert_eq!(ConnectionRole::GateKeeper.connect_data_len(), 20);
        assert_eq!(ConnectionRole::Game.connect_data_len(), 36);
        assert!(RoleConnectData::check_len(ConnectionRole::Game, 20).is_err());
    }

    #[test]
    fn test_game_connect_data() {
        let data = RoleConnectData::Game {
            account_id: Uuid::from_u128(1),
            age_instance_id: Uuid::from_u128(2),
        };
        let mut buf = BytesMut::new();
        data.encode(&mut buf);
        assert_eq!(buf.len(), 36);

        let mut bytes = buf.freeze();
        let declared = bytes.read_u32().unwrap();
        RoleConnectData::check_len(ConnectionRole::Game, declared).unwrap();
        assert_eq!(RoleConnectData::read_payload(ConnectionRole::Game, &mut bytes).unwrap(), data);
    }

    #[test]
    fn test_nonzero_token_is_accepted() {
        let mut bytes: &[u8] = &[0xAB; 16];
        let data = RoleConnectData::read_payload(ConnectionRole::Auth, &mut bytes).unwrap();
        assert!(matches!(data, RoleConnectData::Auth { token } if !token.is_nil()));
    }
}
