//! Adaptive Data Rate bookkeeping and LinkADRReq handling.
use lorawan_codec::maccommands::LinkADRReqPayload;

use crate::constants::{ADR_ACK_DELAY, ADR_ACK_LIMIT};
use crate::region::{Region, DR};

/// Tracks whether ADR is enabled and how long it has been since the network
/// last acknowledged an uplink, mirroring the ack-counter state machine of
/// LoRaWAN 1.0.3 §4.3.1.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Adr {
    enabled: bool,
    ack_cnt: u32,
    ack_limit: u32,
    ack_delay: u32,
}

impl Default for Adr {
    fn default() -> Self {
        Self { enabled: false, ack_cnt: 0, ack_limit: ADR_ACK_LIMIT, ack_delay: ADR_ACK_DELAY }
    }
}

impl Adr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables ADR, resetting the ack counter either way.
    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.ack_cnt = 0;
    }

    pub fn setup_ack(&mut self, limit: u32, delay: u32) {
        self.ack_limit = limit;
        self.ack_delay = delay;
    }

    /// Whether the next uplink should set ADRAckReq: true once the network
    /// has gone silent for `ack_limit` uplinks. DR0 never requests, since
    /// there is nowhere lower to fall back to.
    pub fn ack_req_bit(&self, current_dr: DR) -> bool {
        if !self.enabled || current_dr.value() == 0 {
            return false;
        }
        self.ack_cnt >= self.ack_limit
    }

    /// Called once per uplink. Returns a lower data rate to downshift to
    /// once `ack_limit + ack_delay` uplinks have gone unanswered.
    pub fn handle_uplink(&mut self, current_dr: DR) -> Option<DR> {
        self.ack_cnt += 1;
        if current_dr.value() != 0 && self.ack_cnt > self.ack_limit + self.ack_delay {
            self.ack_cnt = 0;
            return DR::new(current_dr.value() - 1);
        }
        None
    }

    /// Called whenever any downlink is received, successful or not: the
    /// network is clearly still listening, so the ack counter resets.
    pub fn handle_downlink(&mut self) {
        self.ack_cnt = 0;
    }
}

/// The per-field acknowledgement bits produced while processing a
/// LinkADRReq, matching the layout of LinkADRAns.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkAdrStatus {
    pub channel_mask_ack: bool,
    pub data_rate_ack: bool,
    pub power_ack: bool,
}

impl LinkAdrStatus {
    pub fn all_ok(&self) -> bool {
        self.channel_mask_ack && self.data_rate_ack && self.power_ack
    }
}

/// The device parameters a LinkADRReq may change, owned by the caller.
pub struct LinkAdrTarget<'a> {
    pub dr: &'a mut DR,
    pub tx_power: &'a mut u8,
    pub nb_trans: &'a mut u8,
}

/// Validates and, if every field is acceptable, applies a LinkADRReq.
///
/// Each of the three fields (channel mask, data rate, tx power) is validated
/// independently so that the per-field ack bits in LinkADRAns are accurate
/// even when the request is rejected as a whole; the change is committed
/// only if `status.all_ok()`.
pub fn handle_link_adr_req(
    region: &mut Region,
    req: &LinkADRReqPayload,
    target: LinkAdrTarget<'_>,
) -> LinkAdrStatus {
    let redundancy = req.redundancy();
    let cntl = redundancy.channel_mask_control();
    let mask = req.channel_mask();
    let raw_mask =
        u16::from(mask.get_index(0)) | (u16::from(mask.get_index(1)) << 8);

    let channel_mask_ack = region.handle_adr_channel_mask(cntl, raw_mask, true);
    let data_rate_ack = region.dr_valid(req.data_rate());
    let power_ack = req.tx_power() <= 7;

    let status = LinkAdrStatus { channel_mask_ack, data_rate_ack, power_ack };

    if status.all_ok() {
        region.handle_adr_channel_mask(cntl, raw_mask, false);
        if let Some(dr) = DR::new(req.data_rate()) {
            *target.dr = dr;
        }
        *target.tx_power = req.tx_power();
        let nb_trans = redundancy.number_of_transmissions();
        *target.nb_trans = if nb_trans == 0 { 1 } else { nb_trans };
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_req_bit_stays_false_below_the_limit() {
        let mut adr = Adr::new();
        adr.enable(true);
        assert!(!adr.ack_req_bit(DR::new(5).unwrap()));
    }

    #[test]
    fn ack_req_bit_fires_after_limit_uplinks_with_no_downlink() {
        let mut adr = Adr::new();
        adr.enable(true);
        for _ in 0..ADR_ACK_LIMIT {
            adr.handle_uplink(DR::new(5).unwrap());
        }
        assert!(adr.ack_req_bit(DR::new(5).unwrap()));
    }

    #[test]
    fn downshifts_after_limit_plus_delay_uplinks() {
        let mut adr = Adr::new();
        adr.enable(true);
        let mut last = None;
        for _ in 0..(ADR_ACK_LIMIT + ADR_ACK_DELAY + 1) {
            last = adr.handle_uplink(DR::new(5).unwrap());
        }
        assert_eq!(last, Some(DR::new(4).unwrap()));
    }

    #[test]
    fn downlink_resets_ack_counter() {
        let mut adr = Adr::new();
        adr.enable(true);
        for _ in 0..10 {
            adr.handle_uplink(DR::new(5).unwrap());
        }
        adr.handle_downlink();
        assert!(!adr.ack_req_bit(DR::new(5).unwrap()));
    }
}
