//! Control channel events posted by a trunked system for logging and UI consumption.

use serde::Serialize;

use p25_core::{Hz, Nac, Tgid, UnitId};

/// Talkgroup as it appears inside an event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TgRecord {
    pub tg_id: Tgid,
    pub tag: String,
    pub priority: u32,
    pub color: u32,
}

/// Subscriber unit as it appears inside an event. `unit_id` is None for calls whose source
/// was never announced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRecord {
    pub unit_id: Option<UnitId>,
    pub tag: String,
    pub color: u32,
}

impl UnitRecord {
    pub fn unknown() -> Self {
        UnitRecord { unit_id: None, tag: String::new(), color: 0 }
    }
}

/// Why a tracked call was ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Periodic sweep found the call inactive
    Expired,
    /// Found stale while scanning for a talkgroup on a new grant
    Stale,
    /// The talkgroup was granted on another frequency or slot
    Moved,
    /// A single-slot call took over the frequency
    Vacated,
}

impl EndReason {
    pub fn code(self) -> u8 {
        match self {
            EndReason::Expired => 1,
            EndReason::Stale => 2,
            EndReason::Moved => 3,
            EndReason::Vacated => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Expired => "expire",
            EndReason::Stale => "stale",
            EndReason::Moved => "moved",
            EndReason::Vacated => "vacated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cc_event", rename_all = "snake_case")]
pub enum CcEvent {
    GrpVChGrant {
        mfrid: u8,
        options: u8,
        frequency: Option<Hz>,
        group: TgRecord,
        srcaddr: UnitRecord,
        tdma_slot: Option<u8>,
    },
    GrpVChGrantMbt {
        options: u8,
        frequency: Option<Hz>,
        group: TgRecord,
        srcaddr: UnitRecord,
        tdma_slot: Option<u8>,
    },
    GrpVChGrantUpdt {
        mfrid: u8,
        frequency1: Option<Hz>,
        group1: TgRecord,
        tdma_slot: Option<u8>,
        /// Only present when the second channel differs from the first
        frequency2: Option<Hz>,
        group2: Option<TgRecord>,
    },
    GrpVChGrantUpdtExp {
        mfrid: u8,
        options: u8,
        frequency: Option<Hz>,
        group: TgRecord,
        tdma_slot: Option<u8>,
    },
    IdenUp {
        iden: u8,
        offset: i64,
        step: u64,
        freq: Hz,
    },
    IdenUpVu {
        iden: u8,
        bwvu: u8,
        offset: i64,
        step: u64,
        freq: Hz,
    },
    IdenUpTdma {
        iden: u8,
        offset: i64,
        step: u64,
        freq: Hz,
        slots: u8,
    },
    AckRespFne {
        aiv: bool,
        ex: bool,
        addl: u32,
        wacn: Option<u32>,
        tsbk_sysid: Option<u16>,
        source: Option<UnitRecord>,
        target: UnitRecord,
    },
    DenyResp {
        aiv: bool,
        reason: u8,
        additional: u32,
        target: UnitRecord,
    },
    GrpAffResp {
        affiliation: &'static str,
        group_aff_value: u8,
        announce_group: TgRecord,
        group: TgRecord,
        target: UnitRecord,
    },
    GrpAffQ {
        source: UnitRecord,
        target: UnitRecord,
    },
    LocRegResp {
        rv: u8,
        rfss: u8,
        siteid: u8,
        group: TgRecord,
        target: UnitRecord,
    },
    URegResp {
        rv: u8,
        tsbk_sysid: u16,
        source: UnitRecord,
        target: UnitRecord,
    },
    URegCmd {
        source: UnitRecord,
        target: UnitRecord,
    },
    UDeRegAck {
        wacn: u32,
        tsbk_sysid: u16,
        source: UnitRecord,
    },
    ExtFnctCmd {
        efclass: u8,
        efoperand: u8,
        efargs: UnitRecord,
        target: UnitRecord,
    },
    MotGrgAddCmd {
        sg: TgRecord,
        ga1: TgRecord,
        ga2: TgRecord,
        ga3: TgRecord,
    },
    MotGrgDelCmd {
        sg: TgRecord,
        ga1: TgRecord,
        ga2: TgRecord,
        ga3: TgRecord,
    },
    MotGrgCnGrant {
        frequency: Option<Hz>,
        sg: TgRecord,
        sa: UnitRecord,
    },
    MotGrgCnGrantUpdt {
        frequency1: Option<Hz>,
        sg1: TgRecord,
        frequency2: Option<Hz>,
        sg2: Option<TgRecord>,
    },
    GrgExencCmd {
        supergroup: TgRecord,
        target_group: Option<TgRecord>,
        target_unit: Option<UnitRecord>,
        algid: u8,
        keyid: u16,
        active: bool,
    },
    EndCall {
        code: u8,
        reason: EndReason,
        srcaddr: UnitRecord,
        tgid: TgRecord,
        duration: f64,
        count: u32,
    },
    DecodeError {
        kind: &'static str,
        error: String,
    },
}

impl CcEvent {
    /// High volume events that are tracked internally but never posted
    pub fn is_filtered(&self) -> bool {
        matches!(
            self,
            CcEvent::MotGrgAddCmd { .. } | CcEvent::GrpVChGrantUpdt { .. } | CcEvent::GrpVChGrantUpdtExp { .. }
        )
    }
}

/// An event together with the identity of the system that posted it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CcEventRecord {
    pub json_type: &'static str,
    #[serde(flatten)]
    pub event: CcEvent,
    /// On-air opcode, -1 for events not tied to a single message
    pub opcode: i32,
    /// RFSS system id, 0 until learned
    pub sysid: u16,
    pub sysname: String,
    pub time: f64,
    pub nac: Nac,
}
