//! LoRaWAN MAC layer implementation written as a non-async state machine, leveraged by `nb_device`.
//! Manages state internally while providing client with transmit and receive frequencies, while writing to and
//! decrypting from send and receive buffers.

use heapless::Vec;
use lorawan_codec::keys::CryptoFactory;
use lorawan_codec::maccommands::{DownlinkMacCommand, MacCommandIterator};
use lorawan_codec::parser::DevAddr;

use crate::adr::{self, Adr};
use crate::{
    radio::{self, RadioBuffer, RfConfig},
    region::{self, Region, DR},
    AppSKey, Downlink, NewSKey,
};
use lora_modulation::BaseBandModulationParams;
use rand_core::RngCore;

pub type FcntDown = u32;
pub type FcntUp = u32;

mod session;
pub use session::{Session, SessionKeys, SESSION_BLOB_LEN};

mod otaa;
pub use otaa::NetworkCredentials;

pub(crate) mod uplink;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    Join,
    Data,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Window {
    _1,
    _2,
}

/// LoRaWAN session-independent radio configuration: the working data rate,
/// power and nb_trans, plus the receive-window timing a network server may
/// retune via MAC commands.
#[derive(Debug, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Configuration {
    pub(crate) data_rate: region::DR,
    pub(crate) tx_power: u8,
    pub(crate) nb_trans: u8,
    rx1_delay: u32,
    join_accept_delay1: u32,
    join_accept_delay2: u32,
}

/// The mutable context threaded into downlink MAC command handling: every
/// piece of state a command might validate against or mutate.
pub(crate) struct MacContext<'a> {
    pub(crate) region: &'a mut Region,
    pub(crate) adr: &'a mut Adr,
    pub(crate) uplink: &'a mut uplink::Uplink,
    pub(crate) link_check: &'a mut Option<(u8, u8)>,
    pub(crate) device_time: &'a mut Option<(u32, u32)>,
    /// SNR of the frame carrying the MAC command being handled, used to
    /// report the DevStatusAns margin.
    pub(crate) snr: i8,
}

impl Configuration {
    /// Dispatches every downlink MAC command found in FOpts or in a port-0
    /// payload. Stops silently at the first command a cursor-based iterator
    /// cannot decode (short buffer, unknown CID) rather than erroring the
    /// whole frame: partial MAC batches are a normal occurrence.
    fn handle_downlink_macs(
        &mut self,
        ctx: &mut MacContext,
        cmds: MacCommandIterator<DownlinkMacCommand>,
    ) {
        for cmd in cmds {
            match cmd {
                DownlinkMacCommand::LinkCheckAns(payload) => {
                    *ctx.link_check = Some((payload.margin(), payload.gateway_count()));
                }
                DownlinkMacCommand::LinkADRReq(payload) => {
                    let target = adr::LinkAdrTarget {
                        dr: &mut self.data_rate,
                        tx_power: &mut self.tx_power,
                        nb_trans: &mut self.nb_trans,
                    };
                    let status = adr::handle_link_adr_req(ctx.region, &payload, target);
                    ctx.uplink.ack_link_adr(
                        status.channel_mask_ack,
                        status.data_rate_ack,
                        status.power_ack,
                    );
                }
                DownlinkMacCommand::DutyCycleReq(_) => {
                    // Duty-cycle enforcement is out of scope; accept and ack.
                    ctx.uplink.ack_duty_cycle();
                }
                DownlinkMacCommand::RXParamSetupReq(payload) => {
                    let dl_settings = payload.dl_settings();
                    let rx1_offset = dl_settings.rx1_dr_offset();
                    let rx2_dr = dl_settings.rx2_data_rate();
                    let freq = payload.frequency().value();

                    let offset_ack = rx1_offset <= 5;
                    let dr_ack = ctx.region.dr_valid(rx2_dr);
                    let freq_ack = ctx.region.frequency_valid(freq);

                    if offset_ack && dr_ack && freq_ack {
                        ctx.region.set_rx1_dr_offset(rx1_offset);
                        if let Some(dr) = DR::new(rx2_dr) {
                            ctx.region.set_rx2(freq, dr);
                        }
                    }
                    ctx.uplink.ack_rx_param_setup(freq_ack, dr_ack, offset_ack);
                }
                DownlinkMacCommand::DevStatusReq(_) => {
                    // No battery sensor is wired up; 255 means "not measurable" per
                    // LoRaWAN 1.0.3 §5. Margin is the SNR of the request's frame.
                    ctx.uplink.ack_dev_status(255, ctx.snr);
                }
                DownlinkMacCommand::NewChannelReq(payload) => {
                    let index = payload.channel_index();
                    let freq = payload.frequency().value();
                    let range = payload.data_rate_range();

                    // Only the fixed DR0..DR5 range (raw 0x50) is supported.
                    let dr_range_ack = range.raw_value() == 0x50;
                    let freq_ack = ctx.region.frequency_valid(freq);

                    if dr_range_ack && freq_ack {
                        ctx.region.set_channel(index as usize, freq);
                    }
                    ctx.uplink.ack_new_channel(freq_ack, dr_range_ack);
                }
                DownlinkMacCommand::RXTimingSetupReq(payload) => {
                    self.rx1_delay = del_to_delay_ms(payload.delay());
                    ctx.uplink.ack_rx_timing_setup();
                }
                DownlinkMacCommand::TXParamSetupReq(_) => {
                    // Dwell-time/max-EIRP negotiation (AS923/other dwell-time
                    // regions) does not apply to EU868; skip silently.
                }
                DownlinkMacCommand::DlChannelReq(_) => {
                    // Downlink-only channel relocation is not supported; skip silently.
                }
                DownlinkMacCommand::DeviceTimeAns(payload) => {
                    *ctx.device_time = Some((payload.seconds(), payload.nano_seconds()));
                }
            }
        }
    }
}

pub(crate) struct Mac {
    pub(crate) configuration: Configuration,
    pub(crate) region: Region,
    adr: Adr,
    board_eirp: BoardEirp,
    /// Max EIRP the device is currently allowed to radiate at TX power index 0,
    /// negotiable via a future TXParamSetupReq-style extension.
    max_eirp: i8,
    state: State,
    /// Channel index the last uplink was transmitted on, needed to compute
    /// the RX1 frequency once the radio turnaround completes.
    tx_channel: usize,
    link_check: Option<(u8, u8)>,
    device_time: Option<(u32, u32)>,
}

struct BoardEirp {
    max_power: u8,
    antenna_gain: i8,
}

#[allow(clippy::large_enum_variant)]
enum State {
    Joined(Session),
    Otaa(otaa::Otaa),
    Unjoined,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// Operation not legal in the current state (e.g. sending before joining).
    NotJoined,
    /// Invalid DR index.
    InvalidDataRate,
    /// No enabled channel to transmit on, or a bad channel index.
    InvalidChannel,
    /// Frequency outside the region band.
    InvalidFrequency,
    /// Both receive windows closed without a valid frame.
    RxTimeout,
    /// Radio reported a CRC failure on a received frame.
    RxCrc,
    /// Payload too long, or frame too short to be valid.
    MsgLen,
    /// Unsupported or malformed MHDR.
    MsgMhdr,
    /// Integrity check (MIC) failed.
    MsgMic,
    /// FOpts and port-0 MAC payload coexist in the same frame.
    MsgFhdr,
    /// Downlink addressed to a different device.
    DevAddrMismatch,
    /// Downlink frame counter did not advance (replay).
    FcntRollback,
    InvalidResponse(Response),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::NotJoined => "not joined",
            Error::InvalidDataRate => "invalid data rate",
            Error::InvalidChannel => "invalid channel",
            Error::InvalidFrequency => "frequency outside region band",
            Error::RxTimeout => "both receive windows closed without a valid frame",
            Error::RxCrc => "CRC failure on received frame",
            Error::MsgLen => "payload too long or frame too short",
            Error::MsgMhdr => "unsupported or malformed MHDR",
            Error::MsgMic => "MIC validation failed",
            Error::MsgFhdr => "FOpts and port-0 MAC payload coexist",
            Error::DevAddrMismatch => "downlink addressed to a different device",
            Error::FcntRollback => "downlink frame counter did not advance",
            Error::InvalidResponse(_) => "response not valid for the requested operation",
        };
        write!(f, "{msg}")
    }
}

pub struct SendData<'a> {
    pub data: &'a [u8],
    pub fport: u8,
    pub confirmed: bool,
}

/// The two ADR-derived FCtrl bits (§4.8.1), computed from [`Adr`] once per
/// uplink build and handed to [`Session::prepare_buffer`] so the frame codec
/// doesn't need its own copy of the ADR engine's state.
pub(crate) struct AdrBits {
    pub(crate) enabled: bool,
    pub(crate) ack_req: bool,
}

pub(crate) type Result<T = ()> = core::result::Result<T, Error>;

impl Mac {
    pub(crate) fn new(region: Region, max_power: u8, antenna_gain: i8) -> Self {
        Self {
            board_eirp: BoardEirp { max_power, antenna_gain },
            max_eirp: crate::constants::DEFAULT_MAX_EIRP,
            region,
            adr: Adr::new(),
            state: State::Unjoined,
            tx_channel: 0,
            link_check: None,
            device_time: None,
            configuration: Configuration {
                data_rate: DR::new(0).expect("DR0 always exists"),
                tx_power: 0,
                nb_trans: 1,
                rx1_delay: crate::constants::RECEIVE_DELAY1,
                join_accept_delay1: crate::constants::JOIN_ACCEPT_DELAY1,
                join_accept_delay2: crate::constants::JOIN_ACCEPT_DELAY2,
            },
        }
    }

    fn rf_config(&self, dr: DR, freq: u32) -> RfConfig {
        let (sf, bw) = self.region.datarate_params(dr);
        RfConfig {
            frequency: freq,
            bb: BaseBandModulationParams::new(sf, bw, crate::constants::DEFAULT_CODING_RATE),
        }
    }

    fn create_tx_config<RNG: RngCore>(
        &mut self,
        rng: &mut RNG,
        frame: Frame,
    ) -> Result<radio::TxConfig> {
        let (channel, freq) = match frame {
            Frame::Join => self.region.join_channel(rng),
            Frame::Data => self.region.pick_data_channel(rng).ok_or(Error::InvalidChannel)?,
        };
        self.tx_channel = channel;
        let pw = self.max_eirp
            - (self.configuration.tx_power as i8) * crate::constants::TX_POWER_STEP_DB;
        let mut tx_config =
            radio::TxConfig { pw, rf: self.rf_config(self.configuration.data_rate, freq) };
        tx_config.adjust_power(self.board_eirp.max_power, self.board_eirp.antenna_gain);
        Ok(tx_config)
    }

    /// Prepare the radio buffer with transmitting a join request frame and provides the radio
    /// configuration for the transmission.
    pub(crate) fn join_otaa<C: CryptoFactory + Default, RNG: RngCore, const N: usize>(
        &mut self,
        rng: &mut RNG,
        credentials: NetworkCredentials,
        buf: &mut RadioBuffer<N>,
    ) -> (radio::TxConfig, u16) {
        let mut otaa = otaa::Otaa::new(credentials);
        let dev_nonce = otaa.prepare_buffer::<RNG, N>(rng, buf);
        self.state = State::Otaa(otaa);
        let tx_config = self
            .create_tx_config(rng, Frame::Join)
            .expect("join channels are always available");
        (tx_config, dev_nonce)
    }

    /// Join via ABP. This does not transmit a join request frame, but instead sets the session.
    pub(crate) fn join_abp(&mut self, newskey: NewSKey, appskey: AppSKey, devaddr: DevAddr<[u8; 4]>) {
        self.state = State::Joined(Session::new(newskey, appskey, devaddr));
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.state = State::Joined(session);
    }

    /// Prepare the radio buffer for transmitting a data frame and provide the radio configuration
    /// for the transmission. Returns an error if the device is not joined.
    pub(crate) fn send<C: CryptoFactory + Default, RNG: RngCore, const N: usize>(
        &mut self,
        rng: &mut RNG,
        buf: &mut RadioBuffer<N>,
        send_data: &SendData,
    ) -> Result<(radio::TxConfig, FcntUp)> {
        if !self.is_joined() {
            return Err(Error::NotJoined);
        }
        if send_data.data.len() > self.get_max_payload_size() {
            return Err(Error::MsgLen);
        }
        let pending_mac = match &self.state {
            State::Joined(session) => session.pending_mac_len(),
            State::Otaa(_) | State::Unjoined => 0,
        };
        if send_data.data.is_empty() && pending_mac == 0 {
            return Err(Error::MsgLen);
        }
        if let Some(new_dr) = self.adr.handle_uplink(self.configuration.data_rate) {
            self.configuration.data_rate = new_dr;
        }
        let adr_bits = AdrBits {
            enabled: self.adr.is_enabled(),
            ack_req: self.adr.ack_req_bit(self.configuration.data_rate),
        };
        let fcnt = match &mut self.state {
            State::Joined(ref mut session) => {
                Ok(session.prepare_buffer::<C, N>(send_data, &adr_bits, buf))
            }
            State::Otaa(_) | State::Unjoined => Err(Error::NotJoined),
        }?;
        let tx_config = self.create_tx_config(rng, Frame::Data)?;
        Ok((tx_config, fcnt))
    }

    pub(crate) fn get_rx_delay(&self, frame: &Frame, window: &Window) -> u32 {
        match frame {
            Frame::Join => match window {
                Window::_1 => self.configuration.join_accept_delay1,
                Window::_2 => self.configuration.join_accept_delay2,
            },
            Frame::Data => match window {
                Window::_1 => self.configuration.rx1_delay,
                // LoRaWAN 1.0.3 §5.7: "The second reception slot opens one second
                // after the first reception slot." Not independently configurable.
                Window::_2 => self.configuration.rx1_delay + 1000,
            },
        }
    }

    fn rf_for_window(&self, window: &Window) -> RfConfig {
        match window {
            Window::_1 => {
                let dr = self.region.rx1_datarate(self.configuration.data_rate);
                self.rf_config(dr, self.region.rx1_frequency(self.tx_channel))
            }
            Window::_2 => self.rf_config(self.region.rx2_datarate(), self.region.rx2_frequency()),
        }
    }

    /// Gets the radio configuration and timing for a given frame type and window.
    pub(crate) fn get_rx_parameters_legacy(
        &mut self,
        frame: &Frame,
        window: &Window,
    ) -> (RfConfig, u32) {
        (self.rf_for_window(window), self.get_rx_delay(frame, window))
    }

    /// Handles a received RF frame. Returns None is unparseable, fails decryption, or fails MIC
    /// verification. Upon successful join, provides Response::JoinSuccess. Upon successful data
    /// rx, provides Response::DownlinkReceived. User must take the downlink from vec for
    /// application data.
    pub(crate) fn handle_rx<C: CryptoFactory + Default, const N: usize, const D: usize>(
        &mut self,
        buf: &mut RadioBuffer<N>,
        quality: radio::RxQuality,
        dl: &mut Vec<Downlink, D>,
    ) -> Result<Response> {
        match &mut self.state {
            State::Joined(ref mut session) => session.handle_rx::<C, N, D>(
                &mut self.region,
                &mut self.adr,
                &mut self.configuration,
                &mut self.link_check,
                &mut self.device_time,
                buf,
                quality,
                dl,
            ),
            State::Otaa(ref mut otaa) => {
                if let Some(session) =
                    otaa.handle_rx::<N>(&mut self.region, &mut self.configuration, buf)
                {
                    self.state = State::Joined(session);
                    Ok(Response::JoinSuccess)
                } else {
                    Ok(Response::NoUpdate)
                }
            }
            State::Unjoined => Ok(Response::NoUpdate),
        }
    }

    pub(crate) fn rx2_complete(&mut self) -> Response {
        match &mut self.state {
            State::Joined(session) => session.rx2_complete(),
            State::Otaa(otaa) => otaa.rx2_complete(),
            State::Unjoined => Response::NoUpdate,
        }
    }

    pub(crate) fn get_session_keys(&self) -> Option<SessionKeys> {
        match &self.state {
            State::Joined(session) => session.get_session_keys(),
            State::Otaa(_) | State::Unjoined => None,
        }
    }

    pub(crate) fn get_session(&self) -> Option<&Session> {
        match &self.state {
            State::Joined(session) => Some(session),
            State::Otaa(_) | State::Unjoined => None,
        }
    }

    pub(crate) fn is_joined(&self) -> bool {
        matches!(&self.state, State::Joined(_))
    }

    pub(crate) fn get_fcnt_up(&self) -> Option<FcntUp> {
        match &self.state {
            State::Joined(session) => Some(session.fcnt_up),
            State::Otaa(_) | State::Unjoined => None,
        }
    }

    /// Delivered (margin, gateway_count) from the most recent LinkCheckAns, if any.
    pub(crate) fn take_link_check(&mut self) -> Option<(u8, u8)> {
        self.link_check.take()
    }

    /// Delivered (unix_seconds, fractional_1_256ths_of_a_second) from the most recent
    /// DeviceTimeAns, if any.
    pub(crate) fn take_device_time(&mut self) -> Option<(u32, u32)> {
        self.device_time.take()
    }

    pub(crate) fn adr_enable(&mut self, enabled: bool) {
        self.adr.enable(enabled);
    }

    pub(crate) fn adr_setup_ack(&mut self, limit: u32, delay: u32) {
        self.adr.setup_ack(limit, delay);
    }

    /// Maximum application payload at the current data rate, minus whatever
    /// MAC answers are already queued for the next uplink's FOpts.
    pub(crate) fn get_max_payload_size(&self) -> usize {
        let max = self.region.max_payload_size(self.configuration.data_rate) as usize;
        let pending = match &self.state {
            State::Joined(session) => session.pending_mac_len(),
            State::Otaa(_) | State::Unjoined => 0,
        };
        max.saturating_sub(pending)
    }

    pub(crate) fn set_tx_power(&mut self, index: u8) -> Result<()> {
        if index > crate::constants::MAX_TX_POWER_INDEX {
            return Err(Error::InvalidDataRate);
        }
        self.configuration.tx_power = index;
        Ok(())
    }

    pub(crate) fn set_max_eirp(&mut self, eirp_dbm: i8) {
        self.max_eirp = eirp_dbm;
    }

    pub(crate) fn set_nb_trans(&mut self, nb_trans: u8) {
        self.configuration.nb_trans = nb_trans.clamp(1, 15);
    }

    pub(crate) fn set_rx1_delay(&mut self, delay_s: u8) {
        self.configuration.rx1_delay = del_to_delay_ms(delay_s);
    }

    pub(crate) fn set_rx1_dr_offset(&mut self, offset: u8) -> Result<()> {
        if offset > 5 {
            return Err(Error::InvalidDataRate);
        }
        self.region.set_rx1_dr_offset(offset);
        Ok(())
    }

    pub(crate) fn set_rx2(&mut self, frequency: u32, dr: DR) {
        self.region.set_rx2(frequency, dr);
    }

    /// Serializes the current session (if any) into the persistence blob.
    /// Returns `None` if the device is not joined.
    pub(crate) fn save_session(&self) -> Option<[u8; SESSION_BLOB_LEN]> {
        match &self.state {
            State::Joined(session) => Some(session.to_bytes(self.configuration.data_rate.value())),
            State::Otaa(_) | State::Unjoined => None,
        }
    }

    /// Restores a session previously produced by `save_session`, adopting
    /// its persisted data rate and ack-required bit.
    pub(crate) fn restore_session(&mut self, buf: &[u8]) -> bool {
        if let Some((session, dr, _ack_required)) = Session::from_bytes(buf) {
            if let Some(dr) = DR::new(dr) {
                self.configuration.data_rate = dr;
            }
            self.state = State::Joined(session);
            true
        } else {
            false
        }
    }
}

#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Response {
    NoAck,
    SessionExpired,
    DownlinkReceived(FcntDown),
    NoJoinAccept,
    JoinSuccess,
    NoUpdate,
    RxComplete,
}

impl From<Response> for crate::nb_device::Response {
    fn from(r: Response) -> Self {
        match r {
            Response::SessionExpired => crate::nb_device::Response::SessionExpired,
            Response::DownlinkReceived(fcnt) => crate::nb_device::Response::DownlinkReceived(fcnt),
            Response::NoAck => crate::nb_device::Response::NoAck,
            Response::NoJoinAccept => crate::nb_device::Response::NoJoinAccept,
            Response::JoinSuccess => crate::nb_device::Response::JoinSuccess,
            Response::NoUpdate => crate::nb_device::Response::NoUpdate,
            Response::RxComplete => crate::nb_device::Response::RxComplete,
        }
    }
}

/// Maps RXTimingSetupReq's 0..15 delay field to milliseconds: 0 and 1 both
/// mean one second, matching LoRaWAN 1.0.3 §5.7's "delay of 0 is interpreted
/// as 1 second".
fn del_to_delay_ms(del: u8) -> u32 {
    del.clamp(1, 15) as u32 * 1000
}
