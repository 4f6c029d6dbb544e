//! Multi-Block Trunking messages in the alternate (extended) format.
//! Payload layout as queued by the receiver: header block (10 octets), header CRC (2 octets),
//! then the data octets of all following blocks with the packet CRC removed.

use p25_core::{BitBuffer, DecodeErr};

use crate::fields::channel_id::ChannelId;

/// Header octets without CRC
pub const MBT_HEADER_LEN: usize = 10;
/// Offset of the first data octet in the payload
pub const MBT_DATA_OFFSET: usize = 12;
/// Format value of alternate MBT; other formats are not decoded
pub const MBT_FMT_EXTENDED: u8 = 0x17;
/// Trunking control service access point
pub const MBT_SAP_TRUNKING: u8 = 0x3d;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbtHeader {
    /// 5 bits
    pub fmt: u8,
    /// 6 bits, service access point
    pub sap: u8,
    /// 24 bits, logical link id (source of the request)
    pub llid: u32,
    /// 6 bits
    pub opcode: u8,
    /// Octet 8; service options for grants, RFSS id for adjacent status
    pub octet8: u8,
    /// Octet 9
    pub octet9: u8,
    /// 12 bits ending at octet 6, system id for broadcast messages
    pub syid: u16,
}

impl MbtHeader {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        buffer.skip_field(3, "an_io")?;
        let fmt = buffer.read_field(5, "fmt")? as u8;
        buffer.skip_field(2, "sap_hdr")?;
        let sap = buffer.read_field(6, "sap")? as u8;
        buffer.skip_field(8, "mfid")?;
        let llid = buffer.read_field(24, "llid")? as u32;
        buffer.skip_field(10, "blocks")?;
        let opcode = buffer.read_field(6, "opcode")? as u8;
        let octet8 = buffer.read_field(8, "octet8")? as u8;
        let octet9 = buffer.read_field(8, "octet9")? as u8;
        // syid overlays the low 12 bits of the llid field
        let syid = (llid & 0xfff) as u16;
        Ok(MbtHeader { fmt, sap, llid, opcode, octet8, octet9, syid })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mbt {
    /// 0x00
    GrpVChGrant {
        source_address: u32,
        opts: u8,
        channel_t: ChannelId,
        channel_r: ChannelId,
        group_address: u32,
    },
    /// 0x3a
    RfssStsBcst {
        syid: u16,
        rfid: u8,
        stid: u8,
        channel_t: ChannelId,
        channel_r: ChannelId,
    },
    /// 0x3b
    NetStsBcst {
        syid: u16,
        wacn: u32,
        channel_t: ChannelId,
        channel_r: ChannelId,
    },
    /// 0x3c
    AdjStsBcst {
        syid: u16,
        rfid: u8,
        stid: u8,
        channel_t: ChannelId,
        channel_r: ChannelId,
    },
    Unsupported,
}

impl Mbt {
    pub fn protected(opts: u8) -> bool {
        opts & 0x40 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbtPdu {
    pub header: MbtHeader,
    pub body: Mbt,
}

impl MbtPdu {
    pub fn from_bytes(payload: &[u8]) -> Result<Self, DecodeErr> {
        if payload.len() < MBT_DATA_OFFSET {
            return Err(DecodeErr::InconsistentLength { expected: MBT_DATA_OFFSET, found: payload.len() });
        }
        let mut hdr_buf = BitBuffer::from_bytes(&payload[..MBT_HEADER_LEN]);
        let header = MbtHeader::from_bitbuf(&mut hdr_buf)?;
        if header.fmt != MBT_FMT_EXTENDED {
            return Err(DecodeErr::UnsupportedFormat { fmt: header.fmt });
        }

        let mut data = BitBuffer::from_bytes(&payload[MBT_DATA_OFFSET..]);
        let body = match header.opcode {
            0x00 => {
                data.skip_field(16, "reserved")?;
                let channel_t = ChannelId::from_raw(data.read_field(16, "channel_t")?);
                let channel_r = ChannelId::from_raw(data.read_field(16, "channel_r")?);
                let group_address = data.read_field(16, "group_address")? as u32;
                Mbt::GrpVChGrant {
                    source_address: header.llid,
                    opts: header.octet8,
                    channel_t,
                    channel_r,
                    group_address,
                }
            }
            0x3a => {
                let rfid = data.read_field(8, "rfid")? as u8;
                let stid = data.read_field(8, "stid")? as u8;
                let channel_t = ChannelId::from_raw(data.read_field(16, "channel_t")?);
                let channel_r = ChannelId::from_raw(data.read_field(16, "channel_r")?);
                Mbt::RfssStsBcst { syid: header.syid, rfid, stid, channel_t, channel_r }
            }
            0x3b => {
                let wacn = data.read_field(20, "wacn")? as u32;
                data.skip_field(4, "reserved")?;
                let channel_t = ChannelId::from_raw(data.read_field(16, "channel_t")?);
                let channel_r = ChannelId::from_raw(data.read_field(16, "channel_r")?);
                Mbt::NetStsBcst { syid: header.syid, wacn, channel_t, channel_r }
            }
            0x3c => {
                let channel_t = ChannelId::from_raw(data.read_field(16, "channel_t")?);
                let channel_r = ChannelId::from_raw(data.read_field(16, "channel_r")?);
                Mbt::AdjStsBcst {
                    syid: header.syid,
                    rfid: header.octet8,
                    stid: header.octet9,
                    channel_t,
                    channel_r,
                }
            }
            _ => Mbt::Unsupported,
        };
        tracing::trace!("mbt opcode {:02x}: {:?}", header.opcode, body);
        Ok(MbtPdu { header, body })
    }
}
