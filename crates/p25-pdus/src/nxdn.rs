//! NXDN control channel (CAC) messages.
//!
//! The CAC record starts with structure(2) and RAN(6), followed by the message type octet
//! (2 flag bits, 6-bit type) and the message body. Minimum body lengths are checked per
//! message type; fields that extend beyond a shorter message fail with BufferEnded.

use p25_core::{BitBuffer, DecodeErr, Hz, expect_min_len};

/// Frequency code to Hz
pub fn nxdn_freq(f: u64) -> Hz {
    f * 1250 + 100_000_000
}

/// 24-bit location id, split according to its category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationId {
    /// None for the reserved category 3
    pub category: Option<u8>,
    pub system: Option<u32>,
    pub site: Option<u32>,
    pub raw: u32,
}

impl LocationId {
    pub fn from_raw(raw: u32) -> Self {
        let raw = raw & 0xffffff;
        let category = (raw >> 22) as u8;
        let system_bits = match category {
            0 => 10,
            2 => 14,
            1 => 17,
            _ => return LocationId { category: None, system: None, site: None, raw },
        };
        let site_bits = 22 - system_bits;
        let system = (raw >> site_bits) & ((1 << system_bits) - 1);
        let site = raw & ((1 << site_bits) - 1);
        LocationId { category: Some(category), system: Some(system), site: Some(site), raw }
    }

    fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        Ok(Self::from_raw(buffer.read_field(24, "location_id")? as u32))
    }
}

/// Fields shared by the call related messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    pub option: u8,
    pub call_type: u8,
    pub call_option: u8,
    pub source_id: u16,
    pub destination_id: u16,
}

impl CallInfo {
    fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let option = buffer.read_field(8, "option")? as u8;
        let call_type = buffer.read_field(3, "call_type")? as u8;
        let call_option = buffer.read_field(5, "call_option")? as u8;
        let source_id = buffer.read_field(16, "source_id")? as u16;
        let destination_id = buffer.read_field(16, "destination_id")? as u16;
        Ok(CallInfo { option, call_type, call_option, source_id, destination_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacentSite {
    pub location: LocationId,
    pub option: u8,
    pub cc: Hz,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacBody {
    SiteInfo {
        location_id: LocationId,
        channel_info: u16,
        service_info: u16,
        restr_info: u32,
        access_info: u32,
        version_no: u8,
        adjacent_alloc: u8,
        cc1: u16,
        cc2: u16,
    },
    SrvInfo { location_id: LocationId, service_info: u16, restr_info: u32 },
    CchInfo { location_id: LocationId, flags1: u8, cc1: Hz, cc2: Hz },
    AdjSiteInfo { sites: [AdjacentSite; 2] },
    VcallResp { call: CallInfo, cause: u8 },
    DcallResp { call: CallInfo, cause: u8 },
    VcallAssgn {
        option: u8,
        call_type: u8,
        call_option: u8,
        source_id: u16,
        group_id: u16,
        timer: u8,
        /// 10-bit channel number overlapping the timer octet and the first frequency field
        channel: u16,
        f1: Hz,
        f2: Hz,
        hexdata: String,
    },
    DcallAssgn {
        option: u8,
        call_type: u8,
        call_option: u8,
        source_id: u16,
        group_id: u16,
        timer: u8,
        f1: Hz,
        f2: Hz,
    },
    RegResp {
        option: u8,
        location_id: u16,
        unit_id: u16,
        group_id: u16,
        cause: u8,
        visitor_unit: u16,
        visitor_group: u16,
    },
    RegCResp { option: u8, location_id: u16, unit_id: u16 },
    GrpRegResp { option: u8, destination_id: u16, group_id: u16, cause: u8, visitor_group_id: u16 },
    StatReq { call: CallInfo, spare: u8 },
    StatResp { call: CallInfo, cause: u8 },
    SdcallReqHeader { call: CallInfo, cipher_type: u8, key_id: u8 },
    SdcallReqUserdata { packet_frame: u8, block_number: u8, hexdata: String },
    SdcallResp { call: CallInfo, cause: u8 },
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacMessage {
    pub structure: u8,
    pub ran: u8,
    pub msg_type: u8,
    pub body: CacBody,
}

impl CacMessage {
    pub fn msg_type_name(&self) -> String {
        match &self.body {
            CacBody::SiteInfo { .. } => "SITE_INFO".to_string(),
            CacBody::SrvInfo { .. } => "SRV_INFO".to_string(),
            CacBody::CchInfo { .. } => "CCH_INFO".to_string(),
            CacBody::AdjSiteInfo { .. } => "ADJ_SITE_INFO".to_string(),
            CacBody::VcallResp { .. } => "VCALL_RESP".to_string(),
            CacBody::DcallResp { .. } => "DCALL_RESP".to_string(),
            CacBody::VcallAssgn { .. } => "VCALL_ASSGN".to_string(),
            CacBody::DcallAssgn { .. } => "DCALL_ASSGN".to_string(),
            CacBody::RegResp { .. } => "REG_RESP".to_string(),
            CacBody::RegCResp { .. } => "REG_C_RESP".to_string(),
            CacBody::GrpRegResp { .. } => "GRP_REG_RESP".to_string(),
            CacBody::StatReq { .. } => "STAT_REQ".to_string(),
            CacBody::StatResp { .. } => "STAT_RESP".to_string(),
            CacBody::SdcallReqHeader { .. } => "SDCALL_REQ_HEADER".to_string(),
            CacBody::SdcallReqUserdata { .. } => "SDCALL_REQ_USERDATA".to_string(),
            CacBody::SdcallResp { .. } => "SDCALL_RESP".to_string(),
            CacBody::Unsupported => format!("UNSUPPORTED 0x{:x}", self.msg_type),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeErr> {
        let mut buf = BitBuffer::from_bytes(data);
        let structure = buf.read_field(2, "structure")? as u8;
        let ran = buf.read_field(6, "ran")? as u8;

        // length checks apply to the message, type octet included
        let msg_len = buf.get_len_remaining();
        let hexdata = hex_from(&buf);
        buf.skip_field(2, "flags")?;
        let msg_type = buf.read_field(6, "msg_type")? as u8;

        let body = match msg_type {
            0x18 => {
                if msg_len != 144 {
                    return Err(DecodeErr::InconsistentLength { expected: 144, found: msg_len });
                }
                CacBody::SiteInfo {
                    location_id: LocationId::from_bitbuf(&mut buf)?,
                    channel_info: buf.read_field(16, "channel_info")? as u16,
                    service_info: buf.read_field(16, "service_info")? as u16,
                    restr_info: buf.read_field(24, "restr_info")? as u32,
                    access_info: buf.read_field(24, "access_info")? as u32,
                    version_no: buf.read_field(8, "version_no")? as u8,
                    adjacent_alloc: buf.read_field(4, "adjacent_alloc")? as u8,
                    cc1: buf.read_field(10, "cc1")? as u16,
                    cc2: buf.read_field(10, "cc2")? as u16,
                }
            }
            0x19 => {
                expect_min_len!(msg_len, 72)?;
                CacBody::SrvInfo {
                    location_id: LocationId::from_bitbuf(&mut buf)?,
                    service_info: buf.read_field(16, "service_info")? as u16,
                    restr_info: buf.read_field(24, "restr_info")? as u32,
                }
            }
            0x1a => {
                expect_min_len!(msg_len, 72)?;
                CacBody::CchInfo {
                    location_id: LocationId::from_bitbuf(&mut buf)?,
                    flags1: buf.read_field(8, "flags1")? as u8,
                    cc1: nxdn_freq(buf.read_field(16, "cc1")?),
                    cc2: nxdn_freq(buf.read_field(16, "cc2")?),
                }
            }
            0x1b => {
                expect_min_len!(msg_len, 72)?;
                let mut site = || -> Result<AdjacentSite, DecodeErr> {
                    Ok(AdjacentSite {
                        location: LocationId::from_bitbuf(&mut buf)?,
                        option: buf.read_field(8, "option")? as u8,
                        cc: nxdn_freq(buf.read_field(16, "cc")?),
                    })
                };
                let first = site()?;
                let second = site()?;
                CacBody::AdjSiteInfo { sites: [first, second] }
            }
            0x01 | 0x09 => {
                expect_min_len!(msg_len, 64)?;
                let call = CallInfo::from_bitbuf(&mut buf)?;
                let cause = buf.read_field(8, "cause")? as u8;
                if msg_type == 0x01 {
                    CacBody::VcallResp { call, cause }
                } else {
                    CacBody::DcallResp { call, cause }
                }
            }
            0x04 => {
                expect_min_len!(msg_len, 72)?;
                let option = buf.read_field(8, "option")? as u8;
                let call_type = buf.read_field(3, "call_type")? as u8;
                let call_option = buf.read_field(5, "call_option")? as u8;
                let source_id = buf.read_field(16, "source_id")? as u16;
                let group_id = buf.read_field(16, "group_id")? as u16;
                let channel = buf
                    .peek_bits_startoffset(buf.get_pos() + 6, 10)
                    .ok_or(DecodeErr::BufferEnded { field: Some("channel") })? as u16;
                let timer = buf.read_field(8, "timer")? as u8;
                let f1 = nxdn_freq(buf.read_field(16, "f1")?);
                let f2 = nxdn_freq(buf.read_field(16, "f2")?);
                CacBody::VcallAssgn {
                    option, call_type, call_option, source_id, group_id, timer, channel, f1, f2, hexdata,
                }
            }
            0x0e => {
                expect_min_len!(msg_len, 104)?;
                CacBody::DcallAssgn {
                    option: buf.read_field(8, "option")? as u8,
                    call_type: buf.read_field(3, "call_type")? as u8,
                    call_option: buf.read_field(5, "call_option")? as u8,
                    source_id: buf.read_field(16, "source_id")? as u16,
                    group_id: buf.read_field(16, "group_id")? as u16,
                    timer: buf.read_field(8, "timer")? as u8,
                    f1: nxdn_freq(buf.read_field(16, "f1")?),
                    f2: nxdn_freq(buf.read_field(16, "f2")?),
                }
            }
            0x20 => {
                expect_min_len!(msg_len, 72)?;
                CacBody::RegResp {
                    option: buf.read_field(8, "option")? as u8,
                    location_id: buf.read_field(16, "location_id")? as u16,
                    unit_id: buf.read_field(16, "unit_id")? as u16,
                    group_id: buf.read_field(16, "group_id")? as u16,
                    cause: buf.read_field(8, "cause")? as u8,
                    visitor_unit: buf.read_field(16, "visitor_unit")? as u16,
                    visitor_group: buf.read_field(16, "visitor_group")? as u16,
                }
            }
            0x22 => {
                expect_min_len!(msg_len, 56)?;
                CacBody::RegCResp {
                    option: buf.read_field(8, "option")? as u8,
                    location_id: buf.read_field(16, "location_id")? as u16,
                    unit_id: buf.read_field(16, "unit_id")? as u16,
                }
            }
            0x24 => {
                expect_min_len!(msg_len, 72)?;
                CacBody::GrpRegResp {
                    option: buf.read_field(8, "option")? as u8,
                    destination_id: buf.read_field(16, "destination_id")? as u16,
                    group_id: buf.read_field(16, "group_id")? as u16,
                    cause: buf.read_field(8, "cause")? as u8,
                    visitor_group_id: buf.read_field(16, "visitor_group_id")? as u16,
                }
            }
            0x32 => {
                expect_min_len!(msg_len, 72)?;
                let call = CallInfo::from_bitbuf(&mut buf)?;
                let spare = buf.read_field(8, "spare")? as u8;
                CacBody::StatReq { call, spare }
            }
            0x33 | 0x3b => {
                expect_min_len!(msg_len, 64)?;
                let call = CallInfo::from_bitbuf(&mut buf)?;
                let cause = buf.read_field(8, "cause")? as u8;
                if msg_type == 0x33 {
                    CacBody::StatResp { call, cause }
                } else {
                    CacBody::SdcallResp { call, cause }
                }
            }
            0x38 => {
                expect_min_len!(msg_len, 64)?;
                CacBody::SdcallReqHeader {
                    call: CallInfo::from_bitbuf(&mut buf)?,
                    cipher_type: buf.read_field(2, "cipher_type")? as u8,
                    key_id: buf.read_field(6, "key_id")? as u8,
                }
            }
            0x39 => {
                expect_min_len!(msg_len, 64)?;
                let packet_frame = buf.read_field(4, "packet_frame")? as u8;
                let block_number = buf.read_field(4, "block_number")? as u8;
                CacBody::SdcallReqUserdata { packet_frame, block_number, hexdata: hex_from(&buf) }
            }
            _ => CacBody::Unsupported,
        };
        Ok(CacMessage { structure, ran, msg_type, body })
    }
}

/// Hex string of the whole octets from the current position onwards
fn hex_from(buf: &BitBuffer) -> String {
    let mut s = String::new();
    let mut pos = buf.get_pos();
    while let Some(byte) = buf.peek_bits_startoffset(pos, 8) {
        s.push_str(&format!("{:02x}", byte));
        pos += 8;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_id_categories() {
        // category 0: 10 bit system, 12 bit site
        let loc = LocationId::from_raw((0 << 22) | (0x155 << 12) | 0x0a5);
        assert_eq!(loc.category, Some(0));
        assert_eq!(loc.system, Some(0x155));
        assert_eq!(loc.site, Some(0x0a5));
        // category 1: 17 bit system, 5 bit site
        let loc = LocationId::from_raw((1 << 22) | (0x1abcd << 5) | 3);
        assert_eq!(loc.system, Some(0x1abcd));
        assert_eq!(loc.site, Some(3));
        let loc = LocationId::from_raw(3 << 22);
        assert_eq!(loc.category, None);
        assert_eq!(loc.system, None);
    }

    #[test]
    fn test_cch_info() {
        let mut buf = BitBuffer::new_autoexpand(80);
        buf.write_bits(0, 2);
        buf.write_bits(5, 6);
        buf.write_bits(0x1a, 8);
        buf.write_bits((0 << 22) | (7 << 12) | 1, 24);
        buf.write_bits(0x80, 8);
        buf.write_bits(600, 16);
        buf.write_bits(601, 16);
        let msg = CacMessage::from_bytes(&buf.into_bytes()).unwrap();
        assert_eq!(msg.ran, 5);
        assert_eq!(msg.msg_type_name(), "CCH_INFO");
        let CacBody::CchInfo { location_id, cc1, cc2, .. } = msg.body else { panic!("unexpected {:?}", msg.body) };
        assert_eq!(location_id.system, Some(7));
        assert_eq!(cc1, 100_750_000);
        assert_eq!(cc2, 100_751_250);
    }

    #[test]
    fn test_site_info_length_is_exact() {
        let mut data = vec![0x05, 0x18];
        data.extend_from_slice(&[0u8; 17]);
        assert!(CacMessage::from_bytes(&data).is_ok());
        data.push(0);
        assert_eq!(
            CacMessage::from_bytes(&data),
            Err(DecodeErr::InconsistentLength { expected: 144, found: 152 })
        );
    }

    #[test]
    fn test_short_message() {
        // VCALL_RESP needs 64 bits
        let data = [0x05, 0x01, 0x00, 0x00];
        assert_eq!(
            CacMessage::from_bytes(&data),
            Err(DecodeErr::InconsistentLength { expected: 64, found: 24 })
        );
    }

    #[test]
    fn test_vcall_assignment() {
        let mut buf = BitBuffer::new_autoexpand(104);
        buf.write_bits(0x01, 8);
        buf.write_bits(0x04, 8);
        buf.write_bits(0x00, 8);
        buf.write_bits(0b001, 3);
        buf.write_bits(0b00010, 5);
        buf.write_bits(1234, 16);
        buf.write_bits(200, 16);
        buf.write_bits(0x03, 8);
        buf.write_bits(0x1f40, 16);
        buf.write_bits(0x1f41, 16);
        let msg = CacMessage::from_bytes(&buf.into_bytes()).unwrap();
        let CacBody::VcallAssgn { call_type, source_id, group_id, timer, channel, f1, f2, hexdata, .. } = msg.body
        else {
            panic!("unexpected {:?}", msg.body)
        };
        assert_eq!(call_type, 1);
        assert_eq!(source_id, 1234);
        assert_eq!(group_id, 200);
        assert_eq!(timer, 3);
        // low 2 bits of the timer octet plus the first octet of f1
        assert_eq!(channel, 0x31f);
        assert_eq!(f1, 0x1f40 * 1250 + 100_000_000);
        assert_eq!(f2, 0x1f41 * 1250 + 100_000_000);
        assert!(hexdata.starts_with("0400"));
    }

    #[test]
    fn test_unsupported_type() {
        let msg = CacMessage::from_bytes(&[0x05, 0x3f, 0x00]).unwrap();
        assert_eq!(msg.body, CacBody::Unsupported);
        assert_eq!(msg.msg_type_name(), "UNSUPPORTED 0x3f");
    }
}
