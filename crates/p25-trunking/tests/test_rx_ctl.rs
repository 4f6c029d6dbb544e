mod common;

use p25_config::SystemConfig;
use p25_core::debug;
use p25_trunking::{CcEvent, ChannelType, QueueMsg, RxCtlErr, RxState};
use common::*;

const OTHER_NAC: u16 = 0x3a1;
const OTHER_CC: u64 = 852_100_000;

/// Controller sitting on the control channel of the test system with the band plan known.
/// The system hold timer runs until 1003.1.
fn on_control_channel() -> ControlTest {
    let mut t = ControlTest::new(Some(default_test_config()), 1000.0);
    t.take_msgqueue();
    t.advance(0.1);
    t.deliver_tsbk(TEST_NAC, &iden_up_default());
    t.take_msgqueue();
    t
}

/// Grants `tgid` on 851.5125 MHz and checks the controller follows it
fn follow_grant(t: &mut ControlTest, tgid: u32) {
    t.deliver_tsbk(TEST_NAC, &grant(chan(851_512_500), tgid, 5001));
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, 851_512_500);
    assert_eq!(changes[0].tgid, Some(tgid));
    assert_eq!(changes[0].channel_type, ChannelType::Vc);
    assert_eq!(t.ctl.state(), RxState::ToVc);
    assert_eq!(t.ctl.current_tgid(), Some(tgid));
}

#[test]
fn test_startup_tunes_control_channel() {
    debug::setup_logging_verbose();
    let mut t = ControlTest::new(Some(default_test_config()), 1000.0);

    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, CC1);
    assert_eq!(changes[0].channel_type, ChannelType::Cc);
    assert_eq!(changes[0].tgid, None);
    assert_eq!(changes[0].nac, TEST_NAC);
    assert_eq!(changes[0].system, "Metro");

    assert_eq!(t.ctl.state(), RxState::Cc);
    assert_eq!(t.ctl.current_nac(), Some(TEST_NAC));
    assert!(t.ctl.status_msg().starts_with("F 851.012500 TG None"));
}

#[test]
fn test_voice_call_and_release() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    t.advance(0.1);
    follow_grant(&mut t, 1001);
    assert_eq!(t.ctl.tgid_hold(), Some(1001));

    // voice confirms the channel
    t.advance(0.1);
    t.deliver_duid(TEST_NAC, DUID_LDU1);
    assert_eq!(t.ctl.state(), RxState::Vc);
    assert!(freq_changes(&t.take_msgqueue()).is_empty());

    // terminator with release goes straight back to the control channel
    t.advance(0.2);
    t.deliver_duid(TEST_NAC, DUID_TDU_RELEASE);
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    tracing::info!("changes after release: {:?}", changes);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, CC1);
    assert_eq!(changes[0].channel_type, ChannelType::Cc);
    assert_eq!(t.ctl.state(), RxState::Cc);
    assert_eq!(t.ctl.current_tgid(), None);
    // the talkgroup stays preferred for a while
    assert_eq!(t.ctl.tgid_hold(), Some(1001));
    assert!(!t.ctl.in_voice_state());
}

#[test]
fn test_terminator_without_release_keeps_channel() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();
    t.advance(0.1);
    follow_grant(&mut t, 1001);

    t.advance(0.1);
    t.deliver_duid(TEST_NAC, 3);
    assert_eq!(t.ctl.state(), RxState::ToVc);
    assert!(freq_changes(&t.take_msgqueue()).is_empty());
}

#[test]
fn test_voice_timeout_returns_to_control_channel() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();
    t.advance(0.1);
    follow_grant(&mut t, 1001);
    t.advance(0.1);
    t.deliver_duid(TEST_NAC, DUID_LDU1);
    t.take_msgqueue();

    // voice was seen recently, stay
    t.advance(0.5);
    t.deliver(&QueueMsg::timeout(0));
    assert_eq!(t.ctl.state(), RxState::Vc);

    t.advance(1.0);
    t.deliver(&QueueMsg::timeout(0));
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, CC1);
    assert_eq!(t.ctl.state(), RxState::Cc);
    assert_eq!(t.ctl.current_tgid(), None);
}

#[test]
fn test_skip_blacklists_current_talkgroup() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();
    t.advance(0.1);
    follow_grant(&mut t, 2002);

    t.advance(0.2);
    t.command("skip", 0);
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, CC1);
    assert_eq!(changes[0].channel_type, ChannelType::Cc);
    assert_eq!(t.ctl.state(), RxState::Cc);
    assert_eq!(t.ctl.current_tgid(), None);
    assert_eq!(t.ctl.tgid_hold(), None);

    let expiry = t.now + 1.0;
    let sys = t.ctl.system(TEST_NAC).unwrap();
    assert_eq!(sys.blacklist_expiry(2002), Some(Some(expiry)));

    // a fresh grant for the skipped talkgroup is not followed
    t.advance(0.1);
    t.deliver_tsbk(TEST_NAC, &grant(chan(851_512_500), 2002, 5001));
    assert!(freq_changes(&t.take_msgqueue()).is_empty());
    assert_eq!(t.ctl.state(), RxState::Cc);
}

#[test]
fn test_lockout_is_permanent() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();
    t.advance(0.1);
    follow_grant(&mut t, 2002);

    t.advance(0.1);
    t.command("lockout", 0);
    assert_eq!(t.ctl.state(), RxState::Cc);
    assert_eq!(t.ctl.system(TEST_NAC).unwrap().blacklist_expiry(2002), Some(None));
}

#[test]
fn test_hold_without_talkgroup_is_noop() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    t.advance(0.1);
    t.command("hold", 0);
    assert!(!t.ctl.hold_mode());
    assert_eq!(t.ctl.tgid_hold(), None);
    assert_eq!(t.ctl.state(), RxState::Cc);
    assert!(freq_changes(&t.take_msgqueue()).is_empty());
}

#[test]
fn test_hold_pins_talkgroup() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    t.advance(0.1);
    t.command("hold", 1001);
    assert!(t.ctl.hold_mode());
    assert_eq!(t.ctl.tgid_hold(), Some(1001));
    assert_eq!(t.ctl.current_tgid(), Some(1001));
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, CC1);
    assert_eq!(changes[0].tgid, Some(1001));

    // other talkgroups are ignored while holding
    t.advance(0.1);
    t.deliver_tsbk(TEST_NAC, &grant(chan(851_537_500), 1002, 5002));
    assert!(freq_changes(&t.take_msgqueue()).is_empty());
    assert_eq!(t.ctl.state(), RxState::Cc);

    t.advance(0.1);
    follow_grant(&mut t, 1001);

    // toggling off releases the talkgroup
    t.advance(0.1);
    t.command("hold", 1001);
    assert!(!t.ctl.hold_mode());
    assert_eq!(t.ctl.tgid_hold(), None);
    assert_eq!(t.ctl.current_tgid(), None);
    assert_eq!(t.ctl.state(), RxState::Cc);
    let msgs = t.take_msgqueue();
    assert_eq!(freq_changes(&msgs).iter().map(|p| p.freq).collect::<Vec<_>>(), vec![CC1]);
}

#[test]
fn test_set_and_unset_hold() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    // nothing to pin yet
    t.command("set_hold", 0);
    assert!(!t.ctl.hold_mode());

    t.advance(0.1);
    follow_grant(&mut t, 1001);
    t.command("set_hold", 0);
    assert!(t.ctl.hold_mode());
    assert_eq!(t.ctl.tgid_hold(), Some(1001));

    t.advance(0.1);
    t.command("unset_hold", 0);
    assert!(!t.ctl.hold_mode());
    assert_eq!(t.ctl.tgid_hold(), None);
    assert_eq!(t.ctl.current_tgid(), None);
}

#[test]
fn test_control_channel_hunt() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    // control channel traffic at 1000.1 holds off the hunt
    t.ctl.parallel_hunt_cc(1005.0);
    assert!(t.take_msgqueue().is_empty());

    t.ctl.parallel_hunt_cc(1008.2);
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, CC2);
    assert_eq!(changes[0].channel_type, ChannelType::Cc);
    assert_eq!(t.ctl.system(TEST_NAC).unwrap().trunk_cc, CC2);

    // the next hunt waits for another hold period, then wraps
    t.ctl.parallel_hunt_cc(1010.0);
    assert!(t.take_msgqueue().is_empty());
    t.ctl.parallel_hunt_cc(1016.5);
    assert_eq!(t.ctl.system(TEST_NAC).unwrap().trunk_cc, CC1);
}

#[test]
fn test_timeouts_on_control_channel_hunt() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    t.now = 1008.2;
    t.deliver(&QueueMsg::timeout(0));
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.iter().map(|p| p.freq).collect::<Vec<_>>(), vec![CC2]);
    assert_eq!(t.ctl.state(), RxState::Cc);
}

#[test]
fn test_system_rotation_and_enabled_nacs() {
    debug::setup_logging_verbose();
    let mut config = default_test_config();
    config.systems.push(SystemConfig::new(OTHER_NAC, "County", vec![OTHER_CC]));
    let mut t = ControlTest::new(Some(config), 1000.0);

    // the rotation cursor advances before the first pick
    assert_eq!(t.ctl.current_nac(), Some(OTHER_NAC));
    assert_eq!(freq_changes(&t.take_msgqueue())[0].freq, OTHER_CC);

    // nothing to follow, move on
    t.advance(0.1);
    t.deliver(&QueueMsg::timeout(0));
    assert_eq!(t.ctl.current_nac(), Some(TEST_NAC));
    let msgs = t.take_msgqueue();
    assert_eq!(freq_changes(&msgs).iter().map(|p| p.freq).collect::<Vec<_>>(), vec![CC1]);

    t.deliver(&QueueMsg::command("settings-enable 0x3a1", 0));
    assert_eq!(t.ctl.enabled_nacs(), Some(&[OTHER_NAC][..]));

    // the current system is disabled, switch right away
    t.advance(0.1);
    t.deliver(&QueueMsg::timeout(0));
    assert_eq!(t.ctl.current_nac(), Some(OTHER_NAC));
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, OTHER_CC);
    assert_eq!(changes[0].nac, OTHER_NAC);
    assert_eq!(changes[0].system, "County");

    // an empty list is refused
    assert!(matches!(t.ctl.enable_status(" "), Err(RxCtlErr::InvalidNacList(_))));
    t.deliver(&QueueMsg::command("settings-enable", 0));
    assert_eq!(t.ctl.enabled_nacs(), Some(&[OTHER_NAC][..]));
}

#[test]
fn test_crc_error_leaves_state_unchanged() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    let corrupted = [0x3a, 0x00, 0x10, 0x12, 0xae, 0x01, 0x01, 0x33, 0x48, 0x70, 0x4a, 0x54];
    t.advance(0.1);
    t.deliver_tsbk(TEST_NAC, &corrupted);

    let msgs = t.take_msgqueue();
    assert!(freq_changes(&msgs).is_empty());
    let evs = events(&msgs);
    assert_eq!(evs.len(), 1);
    assert!(matches!(evs[0].event, CcEvent::DecodeError { kind: "tsbk", .. }));
    assert_eq!(evs[0].nac, TEST_NAC);
    assert_eq!(t.ctl.state(), RxState::Cc);
    assert_eq!(t.ctl.system(TEST_NAC).unwrap().stats.crc, 1);
}

#[test]
fn test_sink_failure_does_not_change_state() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();
    t.ctl.sink_mut().fail = true;

    t.advance(0.1);
    t.deliver_tsbk(TEST_NAC, &grant(chan(851_512_500), 1001, 5001));
    assert_eq!(t.ctl.state(), RxState::ToVc);
    assert_eq!(t.ctl.current_tgid(), Some(1001));
    assert!(t.take_msgqueue().is_empty());

    t.ctl.sink_mut().fail = false;
    t.advance(0.1);
    t.deliver_duid(TEST_NAC, DUID_TDU_RELEASE);
    assert_eq!(freq_changes(&t.take_msgqueue()).len(), 1);
}

#[test]
fn test_unconfigured_nac_is_ignored() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();

    t.advance(0.1);
    t.deliver_tsbk(0x111, &iden_up_default());
    assert!(t.ctl.system(0x111).is_none());
    t.deliver_tsbk(0xffff, &iden_up_default());
    assert!(t.take_msgqueue().is_empty());
}

#[test]
fn test_call_info_and_status() {
    debug::setup_logging_verbose();
    let mut t = on_control_channel();
    t.advance(0.1);
    follow_grant(&mut t, 1001);

    t.advance(0.1);
    let info = r#"{"nac": 659, "srcaddr": 5001, "grpaddr": 1001, "algid": 132, "alg": "AES-256", "keyid": 4660}"#;
    t.deliver(&QueueMsg::call_info(0, info));
    let sys = t.ctl.system(TEST_NAC).unwrap();
    assert_eq!(sys.crypto.algid, 0x84);
    assert_eq!(sys.crypto.alg, "AES-256");
    assert_eq!(sys.crypto.keyid, 0x1234);
    assert_eq!(sys.last_voice_time, t.now);

    let now = t.now;
    let json: serde_json::Value = serde_json::from_str(&t.ctl.to_json(now).unwrap()).unwrap();
    assert_eq!(json["json_type"], "trunk_update");
    assert_eq!(json["659"]["sysname"], "Metro");
    assert_eq!(json["659"]["algid"], 132);
    assert_eq!(json["data"]["tgid_hold"], 1001);
    assert_eq!(json["data"]["hold_mode"], false);

    assert_eq!(t.ctl.dump_tgids().get(&TEST_NAC), Some(&vec![1001]));
    assert!(t.ctl.describe(now).contains("NAC 0x293"));
}

#[test]
fn test_manual_mode_and_default_config() {
    debug::setup_logging_verbose();
    let nac = 0x4b1;
    let mut t = ControlTest::new(None, 1000.0);
    assert!(t.take_msgqueue().is_empty());

    // systems are picked up from control channel traffic, the receiver is never retuned
    t.advance(0.1);
    t.deliver_tsbk(nac, &iden_up_default());
    t.deliver_tsbk(nac, &rfss_sts(0x2ae, 1, 7, chan(CC1)));
    t.deliver_tsbk(nac, &grant(chan(851_512_500), 1001, 5001));
    assert!(freq_changes(&t.take_msgqueue()).is_empty());
    assert_eq!(t.ctl.state(), RxState::Cc);
    assert!(t.ctl.system(nac).is_some());

    // network identity still unknown
    assert!(!t.ctl.add_default_config(nac));

    t.deliver_tsbk(nac, &net_sts(0xbee00, 0x2ae, chan(CC1)));
    t.deliver(&QueueMsg::command("add_default_config", nac as i64));
    assert_eq!(t.ctl.current_nac(), Some(nac));
    assert_eq!(t.ctl.nacs(), &[nac]);
    let sys = t.ctl.system(nac).unwrap();
    assert_eq!(sys.sysname, "NAC 0x4b1");
    assert_eq!(sys.cc_list(), &[CC1]);
    assert_eq!(sys.trunk_cc, CC1);
    // only once
    assert!(!t.ctl.add_default_config(nac));

    // from now on grants are followed
    t.advance(0.1);
    t.deliver_tsbk(nac, &grant(chan(851_537_500), 1002, 5002));
    let msgs = t.take_msgqueue();
    let changes = freq_changes(&msgs);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].freq, 851_537_500);
    assert_eq!(changes[0].nac, nac);
    assert_eq!(t.ctl.state(), RxState::ToVc);
}

#[test]
fn test_reload_tags() {
    debug::setup_logging_verbose();
    let path = std::env::temp_dir().join(format!("p25-trunking-tags-{}.tsv", std::process::id()));
    std::fs::write(&path, "1001\tDispatch\t205\n2000-2999\tCounty\n").unwrap();

    let mut config = default_test_config();
    config.systems[0].tgid_tags_file = Some(path.to_string_lossy().to_string());
    let mut t = ControlTest::new(Some(config), 1000.0);
    assert_eq!(t.ctl.system(TEST_NAC).unwrap().get_tag(1001), "Talkgroup 1001");

    assert_eq!(t.ctl.reload_tags(TEST_NAC), Ok(2));
    let sys = t.ctl.system(TEST_NAC).unwrap();
    assert_eq!(sys.get_tag(1001), "Dispatch");
    assert_eq!(sys.get_prio(1001), 2);
    assert_eq!(sys.get_tag(2500), "County");

    assert_eq!(t.ctl.reload_tags(0x999), Err(RxCtlErr::UnknownNac(0x999)));

    std::fs::remove_file(&path).unwrap();
    assert!(matches!(t.ctl.reload_tags(TEST_NAC), Err(RxCtlErr::Tags { .. })));
}
