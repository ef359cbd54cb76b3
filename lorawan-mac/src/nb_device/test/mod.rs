use super::*;
use crate::mac::{self, Mac, Session};
use crate::radio::RadioBuffer;
use crate::test_util::*;
use lorawan_codec::default_crypto::DefaultFactory;
use lorawan_codec::parser::DevAddr;

mod util;
pub(crate) use util::test_device;

#[test]
fn join_round_trip_over_rx1() {
    let mut device = test_device();
    device.get_radio().set_rxtx_handler(handle_join_request::<0>);

    let response = device.join(get_otaa_credentials()).unwrap();
    assert!(matches!(response, Response::TimeoutRequest(_)));

    // RX1 window opens.
    let response = device.handle_event(Event::TimeoutFired).unwrap();
    assert!(matches!(response, Response::TimeoutRequest(_)));

    // The network server's JoinAccept arrives inside RX1.
    let response =
        device.handle_event(Event::RadioEvent(radio::Event::Phy(()))).unwrap();
    assert!(matches!(response, Response::JoinSuccess));
    assert!(device.get_session().is_some());
}

#[test]
fn join_falls_through_to_rx2_when_rx1_is_silent() {
    let mut device = test_device();
    device.get_radio().set_rxtx_handler(handle_join_request::<1>);

    device.join(get_otaa_credentials()).unwrap();
    // RX1 opens and then times out unanswered.
    device.handle_event(Event::TimeoutFired).unwrap();
    let response = device.handle_event(Event::TimeoutFired).unwrap();
    assert!(matches!(response, Response::TimeoutRequest(_)));

    let response =
        device.handle_event(Event::RadioEvent(radio::Event::Phy(()))).unwrap();
    assert!(matches!(response, Response::JoinSuccess));
}

#[test]
fn no_join_accept_in_either_window_reports_no_join_accept() {
    let mut device = test_device();
    // No handler installed: Event::Phy finds no uplink/handler pair and the
    // radio just reports Idle, so both windows close without a frame.
    device.join(get_otaa_credentials()).unwrap();
    device.handle_event(Event::TimeoutFired).unwrap(); // RX1 opens
    device.handle_event(Event::TimeoutFired).unwrap(); // RX1 closes, RX2 opens
    let response = device.handle_event(Event::TimeoutFired).unwrap(); // RX2 closes
    assert!(matches!(response, Response::NoJoinAccept));
    assert!(device.get_session().is_none());
}

/// Exercises the exact uplink MIC/encryption vector: dev_addr=0x01020304,
/// fcnt_up=2, NwkSKey=[0x00,0x01,0x02,0x03]x4, AppSKey=[0x04..0x07]x4,
/// FPort=4, payload=[0,1,2,3] unconfirmed.
#[test]
fn uplink_mic_regression_vector() {
    let newskey = crate::NewSKey::from([0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]);
    let appskey = crate::AppSKey::from([4, 5, 6, 7, 4, 5, 6, 7, 4, 5, 6, 7, 4, 5, 6, 7]);
    let devaddr = DevAddr::from(0x0102_0304u32);
    let mut session = Session::new(newskey, appskey, devaddr);
    session.fcnt_up = 2;

    let mut device = test_device();
    device.set_session(session);
    device.send(&[0, 1, 2, 3], 4, false).unwrap();

    let uplink = device.get_radio().last_uplink().expect("uplink was sent").clone();
    let bytes = uplink.as_bytes();
    let len = bytes.len();
    assert_eq!(&bytes[len - 4..], &[0xbf, 0x26, 0x16, 0x0a]);
    assert_eq!(&bytes[len - 8..len - 4], &[0xb8, 0x66, 0x87, 0x5b]);
}

#[test]
fn downlink_data_is_delivered_after_join() {
    let mut device = test_device();
    device.get_radio().set_rxtx_handler(handle_join_request::<2>);
    device.join(get_otaa_credentials()).unwrap();
    device.handle_event(Event::TimeoutFired).unwrap();
    device.handle_event(Event::RadioEvent(radio::Event::Phy(()))).unwrap();
    assert!(device.get_session().is_some());

    device.get_radio().set_rxtx_handler(plain_downlink::<1>);
    device.send(&[1, 2, 3], 3, false).unwrap();
    device.handle_event(Event::TimeoutFired).unwrap();
    let response =
        device.handle_event(Event::RadioEvent(radio::Event::Phy(()))).unwrap();
    assert!(matches!(response, Response::DownlinkReceived(1)));

    let downlink = device.take_downlink().expect("downlink delivered");
    assert_eq!(downlink.data.as_slice(), &[1, 2, 3]);
    assert_eq!(downlink.fport, 3);
}

#[test]
fn link_adr_req_batch_is_answered_on_the_next_uplink() {
    let mut device = test_device();
    device.get_radio().set_rxtx_handler(handle_join_request::<3>);
    device.join(get_otaa_credentials()).unwrap();
    device.handle_event(Event::TimeoutFired).unwrap();
    device.handle_event(Event::RadioEvent(radio::Event::Phy(()))).unwrap();

    // Network server answers the first uplink with two LinkADRReq in FOpts.
    device
        .get_radio()
        .set_rxtx_handler(handle_data_uplink_with_link_adr_req::<0, 1>);
    device.send(&[3, 2, 1], 4, false).unwrap();
    device.handle_event(Event::TimeoutFired).unwrap();
    let response =
        device.handle_event(Event::RadioEvent(radio::Event::Phy(()))).unwrap();
    assert!(matches!(response, Response::DownlinkReceived(1)));

    // The next uplink must carry two LinkADRAns answers in FOpts, which
    // handle_data_uplink_with_link_adr_ans asserts on directly.
    device.get_radio().set_rxtx_handler(handle_data_uplink_with_link_adr_ans);
    device.send(&[], 0, false).unwrap();
}

#[test]
fn downlink_counter_replay_is_rejected() {
    let mut mac = Mac::new(region::Region::new(), 26, 0);
    mac.join_abp(crate::NewSKey::from(get_key()), crate::AppSKey::from(get_key()), get_dev_addr());

    let built = build_downlink(1);
    let mut buf = RadioBuffer::<256>::new();
    buf.extend_from_slice(&built).unwrap();
    let mut dl: Vec<Downlink, 4> = Vec::new();
    let first = mac.handle_rx::<DefaultFactory, 256, 4>(&mut buf, &mut dl).unwrap();
    assert!(matches!(first, mac::Response::DownlinkReceived(1)));

    // Replaying the exact same frame again must not be accepted.
    let mut buf = RadioBuffer::<256>::new();
    buf.extend_from_slice(&built).unwrap();
    let second = mac.handle_rx::<DefaultFactory, 256, 4>(&mut buf, &mut dl);
    assert!(matches!(second, Err(mac::Error::FcntRollback)));
}

fn build_downlink(fcnt: u32) -> heapless::Vec<u8, 64> {
    let mut raw = [0u8; 64];
    let mut phy =
        lorawan_codec::creator::DataPayloadCreator::with_options(&mut raw[..], DefaultFactory)
            .unwrap();
    phy.set_f_port(3);
    phy.set_dev_addr(&[0u8; 4]);
    phy.set_uplink(false);
    phy.set_fcnt(fcnt);
    let finished = phy.build(&[9, 9, 9], &[], &get_key().into(), &get_key().into()).unwrap();
    heapless::Vec::from_slice(finished).unwrap()
}

#[test]
fn session_save_restore_round_trip() {
    let mut device = test_device();
    device.get_radio().set_rxtx_handler(handle_join_request::<4>);
    device.join(get_otaa_credentials()).unwrap();
    device.handle_event(Event::TimeoutFired).unwrap();
    device.handle_event(Event::RadioEvent(radio::Event::Phy(()))).unwrap();
    let original = device.get_session().cloned().expect("joined");

    let blob = device.save_session().expect("joined device saves a session");
    assert_eq!(blob.len(), mac::SESSION_BLOB_LEN);

    let mut restored = test_device();
    assert!(restored.restore_session(&blob));
    let restored_session = restored.get_session().expect("restored session");
    assert_eq!(restored_session.devaddr(), original.devaddr());
    assert_eq!(restored_session.fcnt_up, original.fcnt_up);
    assert_eq!(restored_session.fcnt_down, original.fcnt_down);

    // A flipped byte anywhere must fail the checksum and be rejected.
    let mut corrupt = blob;
    corrupt[10] ^= 0xff;
    let mut rejecting = test_device();
    assert!(!rejecting.restore_session(&corrupt));
}
