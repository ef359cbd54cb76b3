use heapless::Vec;
use lorawan_codec::creator::DataPayloadCreator;
use lorawan_codec::keys::CryptoFactory;
use lorawan_codec::maccommands::{MacCommandIterator, SerializableMacCommand};
use lorawan_codec::parser::{
    parse_with_factory as lorawan_parse, DataHeader, DataPayload, DecryptedJoinAcceptPayload,
    DevAddr, FRMPayload, PhyPayload,
};

use generic_array::{typenum::U256, GenericArray};

use crate::adr::Adr;
use crate::radio::RadioBuffer;
use crate::region::Region;
use crate::Downlink;

use super::{
    otaa::{DevNonce, NetworkCredentials},
    uplink, AdrBits, Configuration, FcntUp, MacContext, Response, SendData,
};

#[derive(Clone, Debug)]
pub struct Session {
    pub(crate) uplink: uplink::Uplink,
    pub confirmed: bool,
    pub newskey: crate::NewSKey,
    pub appskey: crate::AppSKey,
    pub devaddr: DevAddr<[u8; 4]>,
    pub fcnt_up: u32,
    pub fcnt_down: u32,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct SessionKeys {
    pub newskey: crate::NewSKey,
    pub appskey: crate::AppSKey,
    pub devaddr: DevAddr<[u8; 4]>,
}

impl From<Session> for SessionKeys {
    fn from(session: Session) -> Self {
        Self { newskey: session.newskey, appskey: session.appskey, devaddr: session.devaddr }
    }
}

impl Session {
    pub fn derive_new<T: AsRef<[u8]>, F: CryptoFactory>(
        decrypt: &DecryptedJoinAcceptPayload<T, F>,
        devnonce: DevNonce,
        credentials: &NetworkCredentials,
    ) -> Self {
        Self::new(
            decrypt.derive_newskey(&devnonce, credentials.appkey()),
            decrypt.derive_appskey(&devnonce, credentials.appkey()),
            DevAddr::new([
                decrypt.dev_addr().as_ref()[0],
                decrypt.dev_addr().as_ref()[1],
                decrypt.dev_addr().as_ref()[2],
                decrypt.dev_addr().as_ref()[3],
            ])
            .unwrap(),
        )
    }

    pub fn new(newskey: crate::NewSKey, appskey: crate::AppSKey, devaddr: DevAddr<[u8; 4]>) -> Self {
        Self {
            newskey,
            appskey,
            devaddr,
            confirmed: false,
            fcnt_down: 0,
            fcnt_up: 0,
            uplink: uplink::Uplink::default(),
        }
    }

    pub fn devaddr(&self) -> &DevAddr<[u8; 4]> {
        &self.devaddr
    }
    pub fn appskey(&self) -> &crate::AppSKey {
        &self.appskey
    }
    pub fn newskey(&self) -> &crate::NewSKey {
        &self.newskey
    }

    pub fn get_session_keys(&self) -> Option<SessionKeys> {
        Some(SessionKeys { newskey: self.newskey, appskey: self.appskey, devaddr: self.devaddr })
    }

    /// Bytes the next uplink's FOpts will carry, without draining the queue.
    pub(crate) fn pending_mac_len(&self) -> usize {
        self.uplink.pending_len()
    }
}

/// Size in bytes of the session persistence blob produced by [`Session::to_bytes`].
pub const SESSION_BLOB_LEN: usize = 53;

const BLOB_VERSION: u8 = 1;

impl Session {
    /// Serializes this session (plus the session-independent `dr` and
    /// `ack_required` bit) into the persistence blob: version (1), size (2
    /// LE), is_joined (1), ack_required (1), dr (1), dev_addr (4 LE),
    /// fcnt_up (4 LE), fcnt_down (4 LE), nwkskey (16), appskey (16), two
    /// reserved bytes, checksum (1) — 53 bytes total.
    pub fn to_bytes(&self, dr: u8) -> [u8; SESSION_BLOB_LEN] {
        let mut buf = [0u8; SESSION_BLOB_LEN];
        buf[0] = BLOB_VERSION;
        buf[1..3].copy_from_slice(&(SESSION_BLOB_LEN as u16).to_le_bytes());
        buf[3] = 1;
        buf[4] = self.uplink.confirms_downlink() as u8;
        buf[5] = dr;
        buf[6..10].copy_from_slice(self.devaddr.as_ref());
        buf[10..14].copy_from_slice(&self.fcnt_up.to_le_bytes());
        buf[14..18].copy_from_slice(&self.fcnt_down.to_le_bytes());
        buf[18..34].copy_from_slice(self.newskey.as_ref());
        buf[34..50].copy_from_slice(self.appskey.as_ref());
        // buf[50..52] stay reserved/zero.
        buf[52] = lorawan_codec::util::checksum(&buf[..52]);
        buf
    }

    /// Restores a session from a blob produced by [`Session::to_bytes`].
    /// Rejects a blob of the wrong version, wrong declared size, or a bad
    /// checksum. Returns the session plus the persisted `dr` and
    /// `ack_required` bit, since both live outside `Session` proper.
    pub fn from_bytes(buf: &[u8]) -> Option<(Self, u8, bool)> {
        if buf.len() < SESSION_BLOB_LEN {
            return None;
        }
        let buf = &buf[..SESSION_BLOB_LEN];
        if buf[0] != BLOB_VERSION {
            return None;
        }
        if u16::from_le_bytes([buf[1], buf[2]]) as usize != SESSION_BLOB_LEN {
            return None;
        }
        if lorawan_codec::util::checksum(&buf[..52]) != buf[52] {
            return None;
        }
        if buf[3] == 0 {
            return None;
        }
        let ack_required = buf[4] != 0;
        let dr = buf[5];
        let devaddr = DevAddr::new([buf[6], buf[7], buf[8], buf[9]])?;
        let fcnt_up = u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
        let fcnt_down = u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]);
        let mut newskey = [0u8; 16];
        newskey.copy_from_slice(&buf[18..34]);
        let mut appskey = [0u8; 16];
        appskey.copy_from_slice(&buf[34..50]);

        let mut session =
            Self::new(crate::NewSKey::from(newskey), crate::AppSKey::from(appskey), devaddr);
        session.fcnt_up = fcnt_up;
        session.fcnt_down = fcnt_down;
        if ack_required {
            session.uplink.set_downlink_confirmation();
        }
        Some((session, dr, ack_required))
    }
}

impl Session {
    /// Reconstructs the full 32-bit downlink counter from its 16-bit value
    /// on the wire. `prev == 0` accepts the wire value outright (the very
    /// first downlink of a session); otherwise a zero delta is a replay, a
    /// positive delta advances normally, and a negative delta is treated as
    /// exactly one 16-bit wraparound since the last accepted downlink.
    /// Returns `None` to reject (replay or backwards jump beyond one wrap).
    fn compute_fcnt(prev: u32, wire_low: u16) -> Option<u32> {
        if prev == 0 {
            return Some(u32::from(wire_low));
        }
        let low_prev = (prev & 0xFFFF) as u16;
        let delta = wire_low.wrapping_sub(low_prev) as i16;
        match delta.cmp(&0) {
            core::cmp::Ordering::Equal => None,
            core::cmp::Ordering::Greater => Some(prev + delta as u32),
            core::cmp::Ordering::Less => {
                Some((prev & 0xFFFF_0000) + 0x1_0000 + u32::from(wire_low))
            }
        }
    }

    /// Validates, decrypts and dispatches a downlink data frame. Every
    /// rejection reason distinguishes itself in the returned error so the
    /// application can tell a replayed frame from a corrupt one.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn handle_rx<C: CryptoFactory + Default, const N: usize, const D: usize>(
        &mut self,
        region: &mut Region,
        adr: &mut Adr,
        configuration: &mut Configuration,
        link_check: &mut Option<(u8, u8)>,
        device_time: &mut Option<(u32, u32)>,
        rx: &mut RadioBuffer<N>,
        quality: crate::radio::RxQuality,
        dl: &mut Vec<Downlink, D>,
    ) -> super::Result<Response> {
        let phy = lorawan_parse(rx.as_mut_for_read(), C::default()).map_err(map_parse_error)?;
        let PhyPayload::Data(DataPayload::Encrypted(encrypted_data)) = phy else {
            return Err(super::Error::MsgMhdr);
        };

        // Only UnconfirmedDataDown/ConfirmedDataDown are valid downlinks; an
        // uplink-typed mtype here would mean we parsed a frame not meant for us.
        if encrypted_data.is_uplink() {
            return Err(super::Error::MsgMhdr);
        }

        if self.devaddr() != &encrypted_data.fhdr().dev_addr() {
            return Err(super::Error::DevAddrMismatch);
        }

        // FOpts and a port-0 payload both carrying MAC commands would be ambiguous
        // about which one the network server intended; LoRaWAN forbids the overlap.
        if encrypted_data.fhdr().fopts_len() > 0 && encrypted_data.f_port() == Some(0) {
            return Err(super::Error::MsgFhdr);
        }

        let fcnt = Self::compute_fcnt(self.fcnt_down, encrypted_data.fhdr().fcnt())
            .ok_or(super::Error::FcntRollback)?;
        let confirmed = encrypted_data.is_confirmed();
        if !encrypted_data.validate_mic(self.newskey().inner(), fcnt) {
            return Err(super::Error::MsgMic);
        }

        self.fcnt_down = fcnt;
        adr.handle_downlink();

        // MIC has already been validated above, so decryption cannot fail.
        let decrypted = encrypted_data
            .decrypt(Some(self.newskey().inner()), Some(self.appskey().inner()), fcnt)
            .unwrap();

        let mut ctx = MacContext {
            region,
            adr,
            uplink: &mut self.uplink,
            link_check,
            device_time,
            snr: quality.snr(),
        };
        configuration
            .handle_downlink_macs(&mut ctx, MacCommandIterator::from(&decrypted.fhdr()));
        if let FRMPayload::MACCommands(frm_cmds) = decrypted.frm_payload() {
            configuration.handle_downlink_macs(&mut ctx, MacCommandIterator::from(&frm_cmds));
        }

        if confirmed {
            self.uplink.set_downlink_confirmation();
        }

        if let (Some(fport), FRMPayload::Data(data)) =
            (decrypted.f_port(), decrypted.frm_payload())
        {
            // heapless Vec from slice fails only if slice is too large.
            // A data FRM payload will never exceed 256 bytes.
            let data = Vec::from_slice(data).unwrap();
            let _ = dl.push(Downlink { data, fport, rssi: quality.rssi(), snr: quality.snr() });
        }
        Ok(Response::DownlinkReceived(fcnt))
    }

    /// Both receive windows have closed with nothing accepted. A confirmed
    /// uplink that went unacknowledged is reported distinctly from a plain
    /// unconfirmed uplink completing its round trip.
    pub(crate) fn rx2_complete(&mut self) -> Response {
        if self.confirmed {
            Response::NoAck
        } else {
            Response::RxComplete
        }
    }

    pub(crate) fn prepare_buffer<C: CryptoFactory + Default, const N: usize>(
        &mut self,
        data: &SendData,
        adr: &AdrBits,
        tx_buffer: &mut RadioBuffer<N>,
    ) -> FcntUp {
        tx_buffer.clear();
        let fcnt = self.fcnt_up;
        let mut phy: DataPayloadCreator<GenericArray<u8, U256>, C> =
            DataPayloadCreator::with_options(GenericArray::default(), C::default()).unwrap();

        let mut fctrl = lorawan_codec::parser::FCtrl(0x0, true);
        if adr.enabled {
            fctrl.set_adr();
        }
        if adr.ack_req {
            fctrl.set_adr_ack_req();
        }
        if self.uplink.confirms_downlink() {
            fctrl.set_ack();
            self.uplink.clear_downlink_confirmation();
        }

        self.confirmed = data.confirmed;

        phy.set_confirmed(data.confirmed)
            .set_fctrl(&fctrl)
            .set_f_port(data.fport)
            .set_dev_addr(self.devaddr)
            .set_fcnt(fcnt);

        let cmds = self.uplink.get_cmds();
        let mut dyn_cmds: Vec<&dyn SerializableMacCommand, 8> = Vec::new();
        for cmd in &cmds {
            // `dyn_cmds` shares `cmds`'s capacity, so this cannot fail.
            let _ = dyn_cmds.push(cmd.as_dyn());
        }

        match phy.build(data.data, dyn_cmds.as_slice(), self.newskey.inner(), self.appskey.inner()) {
            Ok(packet) => {
                tx_buffer.clear();
                tx_buffer.extend_from_slice(packet).unwrap();
            }
            Err(e) => panic!("Error assembling packet! {e} "),
        }
        // The on-wire counter is committed to the frame before it advances: the
        // frame just sent always carries the value `fcnt` held at entry.
        self.fcnt_up = self.fcnt_up.wrapping_add(1);
        fcnt
    }
}

/// Maps a wire-parse failure onto the coarser error kinds the application
/// sees. The codec doesn't distinguish "too short" from "bad major version"
/// as finely as `§7` does, so both collapse onto the nearest kind.
fn map_parse_error(e: lorawan_codec::parser::Error) -> super::Error {
    use lorawan_codec::parser::Error as ParseError;
    match e {
        ParseError::InvalidData | ParseError::InvalidPayload => super::Error::MsgLen,
        ParseError::InvalidMessageType
        | ParseError::UnsupportedMajorVersion
        | ParseError::InvalidKey => super::Error::MsgMhdr,
        ParseError::InvalidMic => super::Error::MsgMic,
    }
}
