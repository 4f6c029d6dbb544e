pub mod grants;
pub mod iden_up;
pub mod site_status;
pub mod unit_responses;
pub mod vendor;

use p25_core::{BitBuffer, DecodeErr, crc::crc16};

use crate::enums::mfrid::Mfrid;
use crate::enums::tsbk_opcode::TsbkOpcode;

use grants::*;
use iden_up::*;
use site_status::*;
use unit_responses::*;
use vendor::*;

/// TSBK length without the trailing CRC
pub const TSBK_LEN: usize = 10;
/// TSBK length including the CRC
pub const TSBK_LEN_CRC: usize = 12;

/// Octet 0 and 1 of every TSBK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsbkHeader {
    /// Type1, 1 bit, last block
    pub last_block: bool,
    /// Type1, 1 bit, protected
    pub protected: bool,
    /// Type1, 6 bits
    pub opcode: u8,
    /// Type1, 8 bits, manufacturer id
    pub mfrid: u8,
}

impl TsbkHeader {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let last_block = buffer.read_flag("last_block")?;
        let protected = buffer.read_flag("protected")?;
        let opcode = buffer.read_field(6, "opcode")? as u8;
        let mfrid = buffer.read_field(8, "mfrid")? as u8;
        Ok(TsbkHeader { last_block, protected, opcode, mfrid })
    }
}

/// Decoded body of an outbound TSBK, one variant per supported (mfrid, opcode)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tsbk {
    GrpVChGrant(GrpVChGrant),
    GrpVChGrantUpdt(GrpVChGrantUpdt),
    GrpVChGrantUpdtExp(GrpVChGrantUpdtExp),
    SnDataChnGnt(SnDataChnGnt),
    IdenUp(IdenUp),
    IdenUpVu(IdenUpVu),
    IdenUpTdma(IdenUpTdma),
    RfssStsBcst(RfssStsBcst),
    SccbExp(SccbExp),
    NetStsBcst(NetStsBcst),
    AdjStsBcst(AdjStsBcst),
    AckRspFne(AckRspFne),
    DenyRsp(DenyRsp),
    GrpAffRsp(GrpAffRsp),
    GrpAffQ(GrpAffQ),
    LocRegRsp(LocRegRsp),
    URegRsp(URegRsp),
    URegCmd(URegCmd),
    UDeRegAck(UDeRegAck),
    ExtFnctCmd(ExtFnctCmd),
    MotGrgAddCmd(MotGrgCmd),
    MotGrgDelCmd(MotGrgCmd),
    MotGrgCnGrant(MotGrgCnGrant),
    MotGrgCnGrantUpdt(MotGrgCnGrantUpdt),
    HarrisGrgExencCmd(GrgExencCmd),
    /// Known layout but not decoded, or unknown manufacturer
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsbkPdu {
    pub header: TsbkHeader,
    pub body: Tsbk,
}

impl TsbkPdu {
    /// Decodes a TSBK from its 10 octets, or from 12 octets in which case the CRC is verified first
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeErr> {
        let data = match data.len() {
            TSBK_LEN => data,
            TSBK_LEN_CRC => {
                let computed = crc16(data);
                if computed != 0 {
                    return Err(DecodeErr::CrcMismatch { computed });
                }
                &data[..TSBK_LEN]
            }
            found => return Err(DecodeErr::InconsistentLength { expected: TSBK_LEN, found }),
        };
        let mut buffer = BitBuffer::from_bytes(data);
        Self::from_bitbuf(&mut buffer)
    }

    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, DecodeErr> {
        let header = TsbkHeader::from_bitbuf(buffer)?;
        let body = match Mfrid::try_from(header.mfrid as u64) {
            Ok(Mfrid::Standard) => Self::parse_standard(header.opcode, buffer)?,
            Ok(Mfrid::Motorola) => Self::parse_motorola(header.opcode, buffer)?,
            Ok(Mfrid::Harris) => Self::parse_harris(header.opcode, buffer)?,
            Err(()) => Tsbk::Unsupported,
        };
        tracing::trace!("tsbk mfrid {:02x} opcode {:02x}: {:?}", header.mfrid, header.opcode, body);
        Ok(TsbkPdu { header, body })
    }

    fn parse_standard(opcode: u8, buffer: &mut BitBuffer) -> Result<Tsbk, DecodeErr> {
        let Ok(opcode) = TsbkOpcode::try_from(opcode as u64) else {
            return Ok(Tsbk::Unsupported);
        };
        Ok(match opcode {
            TsbkOpcode::GrpVChGrant => Tsbk::GrpVChGrant(GrpVChGrant::from_bitbuf(buffer)?),
            TsbkOpcode::GrpVChGrantUpdt => Tsbk::GrpVChGrantUpdt(GrpVChGrantUpdt::from_bitbuf(buffer)?),
            TsbkOpcode::GrpVChGrantUpdtExp => Tsbk::GrpVChGrantUpdtExp(GrpVChGrantUpdtExp::from_bitbuf(buffer)?),
            TsbkOpcode::SnDataChnGnt => Tsbk::SnDataChnGnt(SnDataChnGnt::from_bitbuf(buffer)?),
            TsbkOpcode::AckRspFne => Tsbk::AckRspFne(AckRspFne::from_bitbuf(buffer)?),
            TsbkOpcode::ExtFnctCmd => Tsbk::ExtFnctCmd(ExtFnctCmd::from_bitbuf(buffer)?),
            TsbkOpcode::DenyRsp => Tsbk::DenyRsp(DenyRsp::from_bitbuf(buffer)?),
            TsbkOpcode::GrpAffRsp => Tsbk::GrpAffRsp(GrpAffRsp::from_bitbuf(buffer)?),
            TsbkOpcode::GrpAffQ => Tsbk::GrpAffQ(GrpAffQ::from_bitbuf(buffer)?),
            TsbkOpcode::LocRegRsp => Tsbk::LocRegRsp(LocRegRsp::from_bitbuf(buffer)?),
            TsbkOpcode::URegRsp => Tsbk::URegRsp(URegRsp::from_bitbuf(buffer)?),
            TsbkOpcode::URegCmd => Tsbk::URegCmd(URegCmd::from_bitbuf(buffer)?),
            TsbkOpcode::UDeRegAck => Tsbk::UDeRegAck(UDeRegAck::from_bitbuf(buffer)?),
            TsbkOpcode::IdenUpTdma => Tsbk::IdenUpTdma(IdenUpTdma::from_bitbuf(buffer)?),
            TsbkOpcode::IdenUpVu => Tsbk::IdenUpVu(IdenUpVu::from_bitbuf(buffer)?),
            TsbkOpcode::SccbExp => Tsbk::SccbExp(SccbExp::from_bitbuf(buffer)?),
            TsbkOpcode::RfssStsBcst => Tsbk::RfssStsBcst(RfssStsBcst::from_bitbuf(buffer)?),
            TsbkOpcode::NetStsBcst => Tsbk::NetStsBcst(NetStsBcst::from_bitbuf(buffer)?),
            TsbkOpcode::AdjStsBcst => Tsbk::AdjStsBcst(AdjStsBcst::from_bitbuf(buffer)?),
            TsbkOpcode::IdenUp => Tsbk::IdenUp(IdenUp::from_bitbuf(buffer)?),
        })
    }

    fn parse_motorola(opcode: u8, buffer: &mut BitBuffer) -> Result<Tsbk, DecodeErr> {
        Ok(match opcode {
            0x00 => Tsbk::MotGrgAddCmd(MotGrgCmd::from_bitbuf(buffer)?),
            0x01 => Tsbk::MotGrgDelCmd(MotGrgCmd::from_bitbuf(buffer)?),
            0x02 => Tsbk::MotGrgCnGrant(MotGrgCnGrant::from_bitbuf(buffer)?),
            0x03 => Tsbk::MotGrgCnGrantUpdt(MotGrgCnGrantUpdt::from_bitbuf(buffer)?),
            _ => Tsbk::Unsupported,
        })
    }

    fn parse_harris(opcode: u8, buffer: &mut BitBuffer) -> Result<Tsbk, DecodeErr> {
        Ok(match opcode {
            0x30 => Tsbk::HarrisGrgExencCmd(GrgExencCmd::from_bitbuf(buffer)?),
            _ => Tsbk::Unsupported,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::channel_id::ChannelId;

    #[test]
    fn test_rfss_status() {
        let data = [0x3a, 0x00, 0x00, 0x12, 0xae, 0x01, 0x01, 0x33, 0x48, 0x70];
        let pdu = TsbkPdu::from_bytes(&data).unwrap();
        assert_eq!(pdu.header.opcode, 0x3a);
        assert_eq!(pdu.header.mfrid, 0x00);
        assert!(!pdu.header.last_block);
        assert_eq!(
            pdu.body,
            Tsbk::RfssStsBcst(RfssStsBcst { syid: 0x2ae, rfid: 1, stid: 1, channel: ChannelId(0x3348) })
        );
    }

    #[test]
    fn test_rfss_status_with_crc() {
        let data = [0x3a, 0x00, 0x00, 0x12, 0xae, 0x01, 0x01, 0x33, 0x48, 0x70, 0x4a, 0x54];
        let pdu = TsbkPdu::from_bytes(&data).unwrap();
        assert!(matches!(pdu.body, Tsbk::RfssStsBcst(_)));

        let mut corrupted = data;
        corrupted[2] = 0x10;
        assert!(matches!(TsbkPdu::from_bytes(&corrupted), Err(DecodeErr::CrcMismatch { .. })));
    }

    #[test]
    fn test_motorola_patch_grant() {
        let data = [0x02, 0x90, 0x00, 0x31, 0x21, 0x00, 0x20, 0x01, 0x8e, 0x7c];
        let pdu = TsbkPdu::from_bytes(&data).unwrap();
        assert_eq!(
            pdu.body,
            Tsbk::MotGrgCnGrant(MotGrgCnGrant { channel: ChannelId(0x3121), supergroup: 32, source_address: 0x018e7c })
        );
    }

    #[test]
    fn test_group_voice_grant() {
        // opts 0x40 (encrypted), channel 0x1028, group 1001, source 0x123456
        let data = [0x00, 0x00, 0x40, 0x10, 0x28, 0x03, 0xe9, 0x12, 0x34, 0x56];
        let pdu = TsbkPdu::from_bytes(&data).unwrap();
        let Tsbk::GrpVChGrant(grant) = pdu.body else { panic!("unexpected {:?}", pdu.body) };
        assert_eq!(grant.channel, ChannelId(0x1028));
        assert_eq!(grant.group_address, 1001);
        assert_eq!(grant.source_address, 0x123456);
        assert!(grant.protected());
    }

    #[test]
    fn test_iden_up() {
        // iden 1, bw 0x064, toff0 0x0b4 (-45 MHz), spacing 100, base 851.0125 MHz
        let mut buf = BitBuffer::new(80);
        buf.write_bits(0x3d, 8);
        buf.write_bits(0x00, 8);
        buf.write_bits(1, 4);
        buf.write_bits(0x064, 9);
        buf.write_bits(0x0b4, 9);
        buf.write_bits(100, 10);
        buf.write_bits(170_202_500, 32);
        let pdu = TsbkPdu::from_bytes(&buf.into_bytes()).unwrap();
        let Tsbk::IdenUp(iden) = pdu.body else { panic!("unexpected {:?}", pdu.body) };
        assert_eq!(iden.iden, 1);
        assert_eq!(iden.ident.base_hz, 851_012_500);
        assert_eq!(iden.ident.step_hz, 12_500);
        assert_eq!(iden.ident.offset_hz, -45_000_000);
    }

    #[test]
    fn test_ack_extended_addressing() {
        // aiv 1, ex 1, wacn 0xbee00, sysid 0x2ae, target 0x000064
        let data = [0x20, 0x00, 0xc0, 0xbe, 0xe0, 0x02, 0xae, 0x00, 0x00, 0x64];
        let pdu = TsbkPdu::from_bytes(&data).unwrap();
        let Tsbk::AckRspFne(ack) = pdu.body else { panic!("unexpected {:?}", pdu.body) };
        assert_eq!(ack.wacn(), Some(0xbee00));
        assert_eq!(ack.sysid(), Some(0x2ae));
        assert_eq!(ack.source(), None);
        assert_eq!(ack.target, 100);
    }

    #[test]
    fn test_harris_group_regroup() {
        // opts: group + active, sg 0x1234, key 0x0042, algid 0x84 target group 0x0bb8
        let data = [0x30, 0xa4, 0x60, 0x12, 0x34, 0x00, 0x42, 0x84, 0x0b, 0xb8];
        let pdu = TsbkPdu::from_bytes(&data).unwrap();
        let Tsbk::HarrisGrgExencCmd(cmd) = pdu.body else { panic!("unexpected {:?}", pdu.body) };
        assert!(cmd.opt_2way);
        assert!(cmd.opt_group);
        assert!(cmd.opt_act);
        assert_eq!(cmd.supergroup, 0x1234);
        assert_eq!(cmd.keyid, 0x42);
        assert_eq!(cmd.algid, 0x84);
        assert_eq!(cmd.target, GrgTarget::Group(3000));
    }

    #[test]
    fn test_unsupported() {
        let unknown_opcode = [0x3f, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(TsbkPdu::from_bytes(&unknown_opcode).unwrap().body, Tsbk::Unsupported);
        let unknown_mfrid = [0x00, 0x55, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(TsbkPdu::from_bytes(&unknown_mfrid).unwrap().body, Tsbk::Unsupported);
    }

    #[test]
    fn test_bad_length() {
        assert_eq!(
            TsbkPdu::from_bytes(&[0x3a, 0x00, 0x00]),
            Err(DecodeErr::InconsistentLength { expected: TSBK_LEN, found: 3 })
        );
    }

    #[test]
    fn test_invalid_tdma_channel_type() {
        // IDEN_UP_TDMA with channel type 7
        let data = [0x33, 0x00, 0x17, 0x00, 0x00, 0x64, 0x0a, 0x25, 0x0c, 0x84];
        assert_eq!(
            TsbkPdu::from_bytes(&data),
            Err(DecodeErr::InvalidValue { field: "channel_type", value: 7 })
        );
    }
}
