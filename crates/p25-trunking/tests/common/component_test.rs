use p25_config::{RxConfig, SystemConfig};
use p25_core::{BitBuffer, Hz, Nac, Tgid, UnitId};
use p25_trunking::{Outbound, QueueMsg, RxCtl};

use super::sink::Sink;

pub const TEST_NAC: Nac = 0x293;
pub const CC1: Hz = 851_012_500;
pub const CC2: Hz = 851_037_500;

/// Band plan of identifier 1 as announced by `iden_up_default`
pub const BASE: Hz = 851_000_000;
pub const STEP: u64 = 12_500;

/// Two-slot TDMA band plan of identifier 2 as announced by `iden_up_tdma_default`
pub const TDMA_BASE: Hz = 852_000_000;

pub const DUID_LDU1: u8 = 5;
pub const DUID_TSBK: u8 = 7;
pub const DUID_TDU_RELEASE: u8 = 15;

/// Creates a single system config for testing. It can still be modified as needed
/// before passing it to the ControlTest constructor
pub fn default_test_config() -> RxConfig {
    let mut config = RxConfig::default();
    config.systems.push(SystemConfig::new(TEST_NAC, "Metro", vec![CC1, CC2]));
    config
}

/// Channel id of `freq` under identifier 1
pub fn chan(freq: Hz) -> u64 {
    (1 << 12) | (freq - BASE) / STEP
}

/// Channel id of `freq` and `slot` under the two-slot identifier 2
pub fn tdma_chan(freq: Hz, slot: u64) -> u64 {
    (2 << 12) | ((freq - TDMA_BASE) / STEP) * 2 | slot
}

/// Standard TSBK without CRC. The body fields are written MSB first and zero padded.
pub fn tsbk(opcode: u64, fields: &[(u64, usize)]) -> Vec<u8> {
    let mut buf = BitBuffer::new(80);
    buf.write_bits(1, 1); // last block
    buf.write_bits(0, 1); // protected
    buf.write_bits(opcode, 6);
    buf.write_bits(0, 8); // mfrid
    for (value, num_bits) in fields {
        buf.write_bits(*value, *num_bits);
    }
    buf.into_bytes()
}

/// IDEN_UP with a positive transmit offset of `offset_mhz`
pub fn iden_up(iden: u64, base: Hz, step: u64, offset_mhz: u64) -> Vec<u8> {
    let toff0 = 0x100 | (offset_mhz * 4);
    tsbk(0x3d, &[(iden, 4), (0x64, 9), (toff0, 9), (step / 125, 10), (base / 5, 32)])
}

pub fn iden_up_default() -> Vec<u8> {
    iden_up(1, BASE, STEP, 45)
}

/// IDEN_UP_TDMA, channel type 3 (two slots per carrier)
pub fn iden_up_tdma_default() -> Vec<u8> {
    tsbk(0x33, &[(2, 4), (3, 4), (0, 14), (STEP / 125, 10), (TDMA_BASE / 5, 32)])
}

pub fn grant(channel: u64, group: Tgid, source: UnitId) -> Vec<u8> {
    tsbk(0x00, &[(0, 8), (channel, 16), (group as u64, 16), (source as u64, 24)])
}

/// Extended format MBT group voice grant: header block, header crc, 8 data octets
pub fn mbt_grant(channel: u64, group: Tgid, source: UnitId) -> Vec<u8> {
    let mut buf = BitBuffer::new_autoexpand(160);
    for (value, bits) in [
        (0b011, 3),
        (0x17, 5),
        (0b11, 2),
        (0x3d, 6),
        (0, 8),
        (source as u64, 24),
        (1, 10),
        (0x00, 6),
        (0, 8),
        (0, 8),
        (0, 16),
        (0, 16),
        (channel, 16),
        (channel, 16),
        (group as u64, 16),
    ] {
        buf.write_bits(value, bits);
    }
    buf.into_bytes()
}

pub fn grant_updt(ch1: u64, ga1: Tgid, ch2: u64, ga2: Tgid) -> Vec<u8> {
    tsbk(0x02, &[(ch1, 16), (ga1 as u64, 16), (ch2, 16), (ga2 as u64, 16)])
}

pub fn rfss_sts(syid: u64, rfid: u64, stid: u64, channel: u64) -> Vec<u8> {
    tsbk(0x3a, &[(0, 12), (syid, 12), (rfid, 8), (stid, 8), (channel, 16)])
}

pub fn net_sts(wacn: u64, syid: u64, channel: u64) -> Vec<u8> {
    tsbk(0x3b, &[(0, 8), (wacn, 20), (syid, 12), (channel, 16)])
}

/// Drives an `RxCtl` with a recording sink and a manual clock
pub struct ControlTest {
    pub ctl: RxCtl<Sink>,
    pub now: f64,
}

impl ControlTest {
    pub fn new(config: Option<RxConfig>, start: f64) -> Self {
        let ctl = RxCtl::new(config, Sink::new(), start);
        Self { ctl, now: start }
    }

    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
    }

    pub fn deliver(&mut self, msg: &QueueMsg) {
        self.ctl.process_qmsg(msg, self.now);
    }

    pub fn deliver_tsbk(&mut self, nac: Nac, tsbk: &[u8]) {
        self.deliver(&QueueMsg::data_unit(0, DUID_TSBK, nac, tsbk));
    }

    pub fn deliver_duid(&mut self, nac: Nac, duid: u8) {
        self.deliver(&QueueMsg::data_unit(0, duid, nac, &[]));
    }

    pub fn command(&mut self, name: &str, arg: i64) {
        self.deliver(&QueueMsg::command(name, arg));
    }

    pub fn take_msgqueue(&mut self) -> Vec<Outbound> {
        self.ctl.sink_mut().take_msgqueue()
    }
}
