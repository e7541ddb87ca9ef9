use bytes::Buf;

pub const DEMO_HEADER_ID: &[u8; 8] = b"HL2DEMO\0";
pub const DEMO_PROTOCOL: i32 = 3;
pub const NETWORK_PROTOCOL: i32 = 7;
pub const GAME_DIRECTORY: &str = "cstrike";

/// network protocols used by the later orange box based releases
pub const NETWORK_PROTOCOL_NEW_MIN: i32 = 14;
pub const NETWORK_PROTOCOL_NEW_MAX: i32 = 24;

const MAX_OSPATH: usize = 260;

/// size of the fixed header preceding the first command
pub const HEADER_SIZE: usize = 8 + 4 + 4 + 4 * MAX_OSPATH + 4 + 4 + 4 + 4;

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("failed to open file \"{name}\"")]
    Open {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file too small")]
    TooSmall,
    #[error("invalid demo header ID")]
    InvalidStamp,
    #[error("demo protocol {0} is invalid - expected {expected}", expected = DEMO_PROTOCOL)]
    DemoProtocol(i32),
    #[error("network protocol {0} is invalid - expected {expected}", expected = NETWORK_PROTOCOL)]
    NetworkProtocol(i32),
    #[error("CS:S v77{} demo - currently unsupported", steam_suffix(.0))]
    Unsupported(i32),
    #[error("game directory \"{0}\" is invalid - expected \"{expected}\"", expected = GAME_DIRECTORY)]
    GameDirectory(String),
}

fn steam_suffix(protocol: &i32) -> &'static str {
    if *protocol == NETWORK_PROTOCOL_NEW_MAX {
        " or Steam CS:S"
    } else {
        ""
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoHeader {
    pub stamp: [u8; 8],
    pub demo_protocol: i32,
    pub network_protocol: i32,
    pub server_name: String,
    pub client_name: String,
    pub map_name: String,
    pub game_directory: String,
    pub playback_time: f32,
    pub playback_ticks: i32,
    pub playback_frames: i32,
    pub signon_length: i32,
}

fn read_fixed_string(buf: &mut &[u8]) -> String {
    let raw = &buf[..MAX_OSPATH];
    let end = raw.iter().position(|&c| c == 0).unwrap_or(MAX_OSPATH);
    let s = String::from_utf8_lossy(&raw[..end]).into_owned();
    buf.advance(MAX_OSPATH);
    s
}

impl DemoHeader {
    /// reads the header without validating it
    pub fn read(data: &[u8]) -> Result<DemoHeader, HeaderError> {
        if data.len() < HEADER_SIZE {
            return Err(HeaderError::TooSmall);
        }

        let mut buf = &data[..HEADER_SIZE];

        let mut stamp = [0u8; 8];
        buf.copy_to_slice(&mut stamp);

        Ok(DemoHeader {
            stamp,
            demo_protocol: buf.get_i32_le(),
            network_protocol: buf.get_i32_le(),
            server_name: read_fixed_string(&mut buf),
            client_name: read_fixed_string(&mut buf),
            map_name: read_fixed_string(&mut buf),
            game_directory: read_fixed_string(&mut buf),
            playback_time: buf.get_f32_le(),
            playback_ticks: buf.get_i32_le(),
            playback_frames: buf.get_i32_le(),
            signon_length: buf.get_i32_le(),
        })
    }

    /// checks the stamp, demo protocol, network protocol and game directory
    /// in that order, the first failing check wins
    pub fn validate(&self) -> Result<(), HeaderError> {
        if &self.stamp != DEMO_HEADER_ID {
            return Err(HeaderError::InvalidStamp);
        }

        if self.demo_protocol != DEMO_PROTOCOL {
            return Err(HeaderError::DemoProtocol(self.demo_protocol));
        }

        if self.network_protocol != NETWORK_PROTOCOL {
            return Err(
                if (NETWORK_PROTOCOL_NEW_MIN..=NETWORK_PROTOCOL_NEW_MAX)
                    .contains(&self.network_protocol)
                {
                    HeaderError::Unsupported(self.network_protocol)
                } else {
                    HeaderError::NetworkProtocol(self.network_protocol)
                },
            );
        }

        if self.game_directory != GAME_DIRECTORY {
            return Err(HeaderError::GameDirectory(self.game_directory.clone()));
        }

        Ok(())
    }

    pub fn parse(data: &[u8]) -> Result<DemoHeader, HeaderError> {
        let header = Self::read(data)?;
        header.validate()?;
        Ok(header)
    }
}
