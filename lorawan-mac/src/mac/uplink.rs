//! Tracks MAC command answers owed to the network and assembles them into
//! the next uplink's FOpts field. Downlink command handlers record an
//! intent here; `prepare_buffer` drains it.
use heapless::Vec;
use lorawan_codec::maccommandcreator::{
    DevStatusAnsCreator, DutyCycleAnsCreator, LinkADRAnsCreator, NewChannelAnsCreator,
    RXParamSetupAnsCreator, RXTimingSetupAnsCreator,
};
use lorawan_codec::maccommands::SerializableMacCommand;

/// LoRaWAN 1.0.x bounds FOpts to 15 bytes; a device that queued more answers
/// than fit just drops the overflow rather than splitting across uplinks.
pub(crate) const MAX_FOPTS_LEN: usize = 15;
const MAX_PENDING: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Ans {
    LinkAdr { channel_mask_ack: bool, data_rate_ack: bool, tx_power_ack: bool },
    DutyCycle,
    RxParamSetup { channel_ack: bool, rx2_dr_ack: bool, rx1_offset_ack: bool },
    DevStatus { battery: u8, margin: i8 },
    NewChannel { freq_ack: bool, dr_range_ack: bool },
    RxTimingSetup,
}

impl Ans {
    fn wire_len(&self) -> usize {
        match self {
            Ans::LinkAdr { .. } => 2,
            Ans::DutyCycle => 1,
            Ans::RxParamSetup { .. } => 2,
            Ans::DevStatus { .. } => 3,
            Ans::NewChannel { .. } => 2,
            Ans::RxTimingSetup => 1,
        }
    }
}

/// A concrete, ready-to-serialize MAC answer, borrowed out as
/// `&dyn SerializableMacCommand` when assembling the uplink frame.
pub(crate) enum AnsCmd {
    LinkAdr(LinkADRAnsCreator),
    DutyCycle(DutyCycleAnsCreator),
    RxParamSetup(RXParamSetupAnsCreator),
    DevStatus(DevStatusAnsCreator),
    NewChannel(NewChannelAnsCreator),
    RxTimingSetup(RXTimingSetupAnsCreator),
}

impl AnsCmd {
    pub(crate) fn as_dyn(&self) -> &dyn SerializableMacCommand {
        match self {
            AnsCmd::LinkAdr(c) => c,
            AnsCmd::DutyCycle(c) => c,
            AnsCmd::RxParamSetup(c) => c,
            AnsCmd::DevStatus(c) => c,
            AnsCmd::NewChannel(c) => c,
            AnsCmd::RxTimingSetup(c) => c,
        }
    }
}

#[derive(Default, Debug, Clone)]
pub struct Uplink {
    pending: Vec<Ans, MAX_PENDING>,
    queued_len: usize,
    confirmed: bool,
}

impl Uplink {
    fn push(&mut self, ans: Ans) {
        let len = ans.wire_len();
        if self.queued_len + len > MAX_FOPTS_LEN || self.pending.push(ans).is_err() {
            crate::log::warn!("dropping MAC answer, FOpts queue is full");
            return;
        }
        self.queued_len += len;
    }

    pub fn set_downlink_confirmation(&mut self) {
        self.confirmed = true;
    }

    pub fn clear_downlink_confirmation(&mut self) {
        self.confirmed = false;
    }

    pub fn confirms_downlink(&self) -> bool {
        self.confirmed
    }

    /// Bytes the next uplink's FOpts field will carry without draining the
    /// queue, for sizing a data frame's maximum application payload.
    pub(crate) fn pending_len(&self) -> usize {
        self.queued_len
    }

    pub(crate) fn ack_link_adr(
        &mut self,
        channel_mask_ack: bool,
        data_rate_ack: bool,
        tx_power_ack: bool,
    ) {
        self.push(Ans::LinkAdr { channel_mask_ack, data_rate_ack, tx_power_ack });
    }

    pub(crate) fn ack_duty_cycle(&mut self) {
        self.push(Ans::DutyCycle);
    }

    pub(crate) fn ack_rx_param_setup(
        &mut self,
        channel_ack: bool,
        rx2_dr_ack: bool,
        rx1_offset_ack: bool,
    ) {
        self.push(Ans::RxParamSetup { channel_ack, rx2_dr_ack, rx1_offset_ack });
    }

    pub(crate) fn ack_dev_status(&mut self, battery: u8, margin: i8) {
        self.push(Ans::DevStatus { battery, margin });
    }

    pub(crate) fn ack_new_channel(&mut self, freq_ack: bool, dr_range_ack: bool) {
        self.push(Ans::NewChannel { freq_ack, dr_range_ack });
    }

    pub(crate) fn ack_rx_timing_setup(&mut self) {
        self.push(Ans::RxTimingSetup);
    }

    /// Drains the pending answer queue, building the concrete wire
    /// representation for each entry.
    pub(crate) fn get_cmds(&mut self) -> Vec<AnsCmd, MAX_PENDING> {
        let mut out = Vec::new();
        for ans in self.pending.iter() {
            let cmd = match *ans {
                Ans::LinkAdr { channel_mask_ack, data_rate_ack, tx_power_ack } => {
                    let mut c = LinkADRAnsCreator::new();
                    c.set_channel_mask_ack(channel_mask_ack)
                        .set_data_rate_ack(data_rate_ack)
                        .set_tx_power_ack(tx_power_ack);
                    AnsCmd::LinkAdr(c)
                }
                Ans::DutyCycle => AnsCmd::DutyCycle(DutyCycleAnsCreator::new()),
                Ans::RxParamSetup { channel_ack, rx2_dr_ack, rx1_offset_ack } => {
                    let mut c = RXParamSetupAnsCreator::new();
                    c.set_channel_ack(channel_ack)
                        .set_rx2_data_rate_ack(rx2_dr_ack)
                        .set_rx1_data_rate_offset_ack(rx1_offset_ack);
                    AnsCmd::RxParamSetup(c)
                }
                Ans::DevStatus { battery, margin } => {
                    let mut c = DevStatusAnsCreator::new();
                    c.set_battery(battery);
                    let _ = c.set_margin(margin);
                    AnsCmd::DevStatus(c)
                }
                Ans::NewChannel { freq_ack, dr_range_ack } => {
                    let mut c = NewChannelAnsCreator::new();
                    c.set_channel_frequency_ack(freq_ack).set_data_rate_range_ack(dr_range_ack);
                    AnsCmd::NewChannel(c)
                }
                Ans::RxTimingSetup => AnsCmd::RxTimingSetup(RXTimingSetupAnsCreator::new()),
            };
            // `pending` and `out` share the same capacity, so this cannot fail.
            let _ = out.push(cmd);
        }
        self.pending.clear();
        self.queued_len = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflowing_the_fopts_budget_drops_the_answer() {
        let mut uplink = Uplink::default();
        for _ in 0..6 {
            uplink.ack_dev_status(100, 5); // 3 bytes each, 6*3 = 18 > 15
        }
        let cmds = uplink.get_cmds();
        assert!(cmds.len() <= 5);
    }

    #[test]
    fn drained_queue_is_empty() {
        let mut uplink = Uplink::default();
        uplink.ack_rx_timing_setup();
        assert_eq!(uplink.get_cmds().len(), 1);
        assert_eq!(uplink.get_cmds().len(), 0);
    }
}
