mod common;

use p25_config::{IdList, TagRegistry, TrunkTiming};
use p25_core::{DecodeErr, debug};
use p25_pdus::fields::channel_id::ChannelId;
use p25_trunking::{CcEvent, EndReason, TrunkedSystem};
use common::*;

fn test_system(now: f64) -> TrunkedSystem {
    let config = default_test_config();
    TrunkedSystem::new(TEST_NAC, config.system(TEST_NAC), TrunkTiming::default(), now)
}

fn end_reasons(sys: &mut TrunkedSystem) -> Vec<EndReason> {
    sys.take_events()
        .into_iter()
        .filter_map(|ev| match ev.event {
            CcEvent::EndCall { reason, .. } => Some(reason),
            _ => None,
        })
        .collect()
}

#[test]
fn test_channel_resolution() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);

    // nothing resolves before the identifier is announced
    assert_eq!(sys.channel_id_to_frequency(ChannelId(0x1029)), None);
    assert_eq!(sys.decode_tsbk(&iden_up_default(), 1000.0), Ok(0));

    for n in [0u16, 1, 41, 0xfff] {
        let f = sys.channel_id_to_frequency(ChannelId(0x1000 | n));
        tracing::info!("channel {} -> {:?}", n, f);
        assert_eq!(f, Some(BASE + STEP * n as u64));
    }
    assert_eq!(sys.iden_table.uplink_frequency(ChannelId(0x1029), 851_512_500), Some(896_512_500));
    assert_eq!(sys.channel_id_to_string(ChannelId(0x1029)), "851.512500");
    assert_eq!(sys.get_tdma_slot(ChannelId(0x1029)), None);

    // unknown identifier: no frequency and no error, the grant is dropped
    assert_eq!(sys.channel_id_to_frequency(ChannelId(0x5001)), None);
    assert_eq!(sys.decode_tsbk(&grant(0x5001, 1001, 5001), 1000.1), Ok(0));
    assert!(sys.talkgroups.is_empty());
    assert!(sys.frequency_tracker().is_empty());
}

#[test]
fn test_tdma_channel_resolution() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    assert_eq!(sys.decode_tsbk(&iden_up_tdma_default(), 1000.0), Ok(0));

    let ch = ChannelId(tdma_chan(852_025_000, 1) as u16);
    assert_eq!(sys.channel_id_to_frequency(ch), Some(852_025_000));
    assert_eq!(sys.get_tdma_slot(ch), Some(1));
}

#[test]
fn test_refresh_does_not_duplicate() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();

    assert_eq!(sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.0), Ok(1));
    assert_eq!(sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.3), Ok(1));

    let entry = sys.frequency_tracker().get(851_512_500).unwrap();
    assert_eq!(entry.counter, 1);
    assert_eq!(entry.tgids(), [Some(1001), None]);
    let call = entry.calls[0].as_ref().unwrap();
    assert_eq!(call.count, 1);
    assert_eq!(call.srcaddr.unit_id, Some(5001));
    assert!(call.is_active());

    assert_eq!(sys.talkgroups.len(), 1);
    assert_eq!(sys.voice_frequencies[&851_512_500].counter, 2);
    assert!(end_reasons(&mut sys).is_empty());
}

#[test]
fn test_grant_update_moves_call() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();

    sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.0).unwrap();
    let ch = chan(851_537_500);
    assert_eq!(sys.decode_tsbk(&grant_updt(ch, 1001, ch, 1001), 1000.5), Ok(2));

    assert_eq!(end_reasons(&mut sys), vec![EndReason::Moved]);
    assert_eq!(sys.frequency_tracker().active_calls(1001), vec![(851_537_500, 0)]);

    let sel = sys.find_talkgroup(1000.0, Some(1001), false).unwrap();
    assert_eq!(sel.tgid, 1001);
    assert_eq!(sel.frequency, 851_537_500);
    assert_eq!(sel.tdma_slot, None);
}

#[test]
fn test_call_expires_once() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.0).unwrap();
    sys.take_events();

    // within the call timeout
    sys.frequency_tracking_expire(1000.5, false);
    assert!(end_reasons(&mut sys).is_empty());

    sys.frequency_tracking_expire(1001.0, false);
    assert_eq!(end_reasons(&mut sys), vec![EndReason::Expired]);

    sys.frequency_tracking_expire(1002.0, false);
    sys.frequency_tracking_expire(1003.0, true);
    assert!(end_reasons(&mut sys).is_empty());
    assert!(sys.frequency_tracker().active_calls(1001).is_empty());
}

#[test]
fn test_find_talkgroup_priority_and_blacklist() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    let mut reg = TagRegistry::new();
    reg.add("1001", "Dispatch", 500).unwrap();
    reg.add("1002", "Fire", 200).unwrap();
    reg.add("1003", "Police", 100).unwrap();
    sys.set_tgid_tags(reg);

    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_537_500), 1002, 5002), 1000.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_562_500), 1003, 5003), 1000.0).unwrap();

    // lowest priority value wins
    assert_eq!(sys.find_talkgroup(1000.0, None, false).map(|s| s.tgid), Some(1003));

    sys.add_blacklist(1003, Some(1005.0));
    assert_eq!(sys.find_talkgroup(1000.0, None, false).map(|s| s.tgid), Some(1002));
    // a preferred talkgroup still loses to a better one
    assert_eq!(sys.find_talkgroup(1000.0, Some(1001), false).map(|s| s.tgid), Some(1002));
    // unless holding
    assert_eq!(sys.find_talkgroup(1000.0, Some(1001), true).map(|s| s.tgid), Some(1001));

    sys.add_blacklist(1002, None);
    assert_eq!(sys.find_talkgroup(1000.0, None, false).map(|s| s.tgid), Some(1001));

    // stale talkgroups are not eligible
    assert_eq!(sys.find_talkgroup(1006.0, None, false), None);

    // the temporary entry expires, the permanent one stays
    sys.decode_tsbk(&grant(chan(851_562_500), 1003, 5003), 1006.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_537_500), 1002, 5002), 1006.0).unwrap();
    assert_eq!(sys.find_talkgroup(1006.0, None, false).map(|s| s.tgid), Some(1003));
    assert!(!sys.is_blacklisted(1003));
    assert_eq!(sys.blacklist_expiry(1002), Some(None));
}

#[test]
fn test_find_talkgroup_whitelist() {
    debug::setup_logging_verbose();
    let mut config = default_test_config();
    config.systems[0].whitelist = Some(IdList::from_ids([1001]));
    let mut sys = TrunkedSystem::new(TEST_NAC, config.system(TEST_NAC), TrunkTiming::default(), 1000.0);

    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_537_500), 1002, 5002), 1000.0).unwrap();
    assert_eq!(sys.find_talkgroup(1000.0, None, false), None);

    sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.0).unwrap();
    assert_eq!(sys.find_talkgroup(1000.0, None, false).map(|s| s.tgid), Some(1001));
}

#[test]
fn test_find_talkgroup_rejects_excluded_preferred() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    sys.add_blacklist(2002, None);
    sys.decode_tsbk(&grant(chan(851_537_500), 2002, 5002), 1000.0).unwrap();

    assert_eq!(sys.find_talkgroup(999.0, Some(2002), false), None);
    assert_eq!(sys.find_talkgroup(999.0, Some(2002), true), None);

    let mut config = default_test_config();
    config.systems[0].whitelist = Some(IdList::from_ids([1001]));
    let mut sys = TrunkedSystem::new(TEST_NAC, config.system(TEST_NAC), TrunkTiming::default(), 1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_537_500), 1002, 5002), 1000.0).unwrap();
    assert_eq!(sys.find_talkgroup(999.0, Some(1002), true), None);

    // an eligible preferred talkgroup is still picked under hold
    sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.0).unwrap();
    assert_eq!(sys.find_talkgroup(999.0, Some(1001), true).map(|s| s.tgid), Some(1001));
}

#[test]
fn test_mbt_grant_resolves_channel_and_group() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    assert!(sys.decode_mbt(&mbt_grant(chan(851_512_500), 1001, 0x123456), 1000.0).is_ok());

    let sel = sys.find_talkgroup(999.0, None, false).unwrap();
    assert_eq!(sel.tgid, 1001);
    assert_eq!(sel.frequency, 851_512_500);
    assert_eq!(sel.srcaddr, 0x123456);
}

#[test]
fn test_tdma_talkgroup_needs_network_identity() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    sys.decode_tsbk(&iden_up_tdma_default(), 1000.0).unwrap();
    sys.decode_tsbk(&grant(tdma_chan(852_025_000, 1), 2001, 5001), 1000.0).unwrap();

    assert_eq!(sys.find_talkgroup(1000.0, None, false), None);

    sys.decode_tsbk(&net_sts(0xbee00, 0x2ae, chan(CC1)), 1000.1).unwrap();
    assert_eq!(sys.ns_wacn, Some(0xbee00));
    assert_eq!(sys.ns_syid, Some(0x2ae));
    assert_eq!(sys.ns_chan, CC1);

    let sel = sys.find_talkgroup(1000.0, None, false).unwrap();
    assert_eq!(sel.tgid, 2001);
    assert_eq!(sel.frequency, 852_025_000);
    assert_eq!(sel.tdma_slot, Some(1));
    assert_eq!(sel.srcaddr, 5001);
}

#[test]
fn test_crc_mismatch_is_reported() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);

    // intact RFSS status block with CRC
    let intact = [0x3a, 0x00, 0x00, 0x12, 0xae, 0x01, 0x01, 0x33, 0x48, 0x70, 0x4a, 0x54];
    assert_eq!(sys.decode_tsbk(&intact, 1000.0), Ok(0));
    assert_eq!(sys.last_tsbk, 1000.0);

    let mut corrupted = intact;
    corrupted[2] ^= 0x10;
    let res = sys.decode_tsbk(&corrupted, 1001.0);
    assert!(matches!(res, Err(DecodeErr::CrcMismatch { .. })));
    assert_eq!(sys.stats.crc, 1);
    assert_eq!(sys.stats.tsbks, 2);
    // a dropped block does not count as control channel traffic
    assert_eq!(sys.last_tsbk, 1000.0);

    let events = sys.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].event, CcEvent::DecodeError { kind: "tsbk", .. }));

    assert!(matches!(sys.decode_tsbk(&intact[..7], 1002.0), Err(DecodeErr::InconsistentLength { .. })));
    assert_eq!(sys.stats.decode_errors, 2);
}

#[test]
fn test_site_identity_and_status() {
    debug::setup_logging_verbose();
    let mut sys = test_system(1000.0);
    sys.decode_tsbk(&iden_up_default(), 1000.0).unwrap();
    sys.decode_tsbk(&rfss_sts(0x2ae, 1, 7, chan(CC1)), 1000.0).unwrap();
    sys.decode_tsbk(&grant(chan(851_512_500), 1001, 5001), 1000.0).unwrap();

    assert_eq!(sys.rfss.syid, 0x2ae);
    assert_eq!(sys.rfss.stid, 7);
    assert_eq!(sys.rfss.chan, CC1);
    assert_eq!(sys.rfss.txchan, CC1 + 45_000_000);

    let status = serde_json::to_value(sys.to_status(1000.2)).unwrap();
    tracing::info!("status: {}", status);
    assert_eq!(status["sysname"], "Metro");
    assert_eq!(status["rxchan"], CC1);
    assert_eq!(status["talkgroup_data"]["1001"]["frequency"], 851_512_500u64);
    assert_eq!(status["frequency_data"]["851512500"]["tgids"][0], 1001);
    assert!(sys.describe(1000.2).contains("syid 2ae"));
}
