//! EU868 regional parameters: data rate table, channel plan and the RX1/RX2
//! windowing rules used to turn a data rate/channel pick into radio
//! parameters.
use lora_modulation::{Bandwidth, SpreadingFactor};
use lorawan_codec::parser::CfList;

use rand_core::RngCore;

use crate::constants::{NUM_CHANNELS, NUM_DATARATES};

/// A validated LoRaWAN data rate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DR(u8);

impl DR {
    pub fn new(value: u8) -> Option<Self> {
        if (value as usize) < NUM_DATARATES {
            Some(DR(value))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl From<DR> for u8 {
    fn from(dr: DR) -> u8 {
        dr.0
    }
}

/// The modulation parameters and maximum application payload size
/// associated with a data rate. Coding rate is fixed at 4/5 for every
/// uplink and is not tracked per data rate.
#[derive(Debug, Clone, Copy)]
pub struct Datarate {
    pub spreading_factor: SpreadingFactor,
    pub bandwidth: Bandwidth,
    pub max_payload_size: u8,
}

/// DR0..DR5: SF12 down to SF7, all at 125 kHz. DR6+ (FSK/250 kHz SF7) is
/// out of scope.
const DATARATES: [Datarate; NUM_DATARATES] = [
    Datarate { spreading_factor: SpreadingFactor::_12, bandwidth: Bandwidth::_125KHz, max_payload_size: 51 },
    Datarate { spreading_factor: SpreadingFactor::_11, bandwidth: Bandwidth::_125KHz, max_payload_size: 51 },
    Datarate { spreading_factor: SpreadingFactor::_10, bandwidth: Bandwidth::_125KHz, max_payload_size: 51 },
    Datarate { spreading_factor: SpreadingFactor::_9, bandwidth: Bandwidth::_125KHz, max_payload_size: 115 },
    Datarate { spreading_factor: SpreadingFactor::_8, bandwidth: Bandwidth::_125KHz, max_payload_size: 222 },
    Datarate { spreading_factor: SpreadingFactor::_7, bandwidth: Bandwidth::_125KHz, max_payload_size: 222 },
];

fn datarate(dr: DR) -> &'static Datarate {
    &DATARATES[dr.value() as usize]
}

/// The fixed join channels, always present and never user-modifiable.
const JOIN_CHANNELS: [u32; 3] = [868_100_000, 868_300_000, 868_500_000];

/// A 16-slot channel table: the 3 read-only join channels plus up to 13
/// channels added via CFList or NewChannelReq.
///
/// Mirrors the random-start linear scan and the shrink-on-disable behavior
/// of a conventional LoRaWAN channel plan implementation.
#[derive(Debug, Clone)]
pub struct ChannelTable {
    frequencies: [u32; NUM_CHANNELS],
    enabled: u16,
    max_count: usize,
}

impl Default for ChannelTable {
    fn default() -> Self {
        let mut frequencies = [0u32; NUM_CHANNELS];
        frequencies[0] = JOIN_CHANNELS[0];
        frequencies[1] = JOIN_CHANNELS[1];
        frequencies[2] = JOIN_CHANNELS[2];
        Self { frequencies, enabled: 0b111, max_count: 3 }
    }
}

impl ChannelTable {
    fn recompute_max_count(&mut self) {
        let mut max_count = 0;
        for i in 0..NUM_CHANNELS {
            if self.enabled & (1 << i) != 0 {
                max_count = i + 1;
            }
        }
        self.max_count = max_count;
    }

    /// Enables or disables a channel.
    pub fn enable(&mut self, index: usize, enable: bool) -> bool {
        if index >= NUM_CHANNELS {
            return false;
        }
        if enable {
            self.enabled |= 1 << index;
            self.max_count = self.max_count.max(index + 1);
        } else {
            self.enabled &= !(1 << index);
            if index + 1 == self.max_count {
                self.recompute_max_count();
            }
        }
        true
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        index < NUM_CHANNELS && self.enabled & (1 << index) != 0
    }

    /// Sets the channel's frequency and enables it.
    pub fn set(&mut self, index: usize, freq: u32) -> bool {
        if index >= NUM_CHANNELS {
            return false;
        }
        self.frequencies[index] = freq;
        self.enable(index, true)
    }

    pub fn frequency(&self, index: usize) -> Option<u32> {
        if self.is_enabled(index) {
            Some(self.frequencies[index])
        } else {
            None
        }
    }

    pub fn exists(&self, index: usize) -> bool {
        self.is_enabled(index)
    }

    /// Picks a random enabled channel, starting from a random index and
    /// scanning forward until either an enabled channel is found or the scan
    /// wraps back to the start (no channel enabled).
    pub fn pick<RNG: RngCore>(&self, rng: &mut RNG) -> Option<(usize, u32)> {
        if self.max_count == 0 {
            return None;
        }
        let start = (rng.next_u32() % self.max_count as u32) as usize;
        let mut ch = start;
        loop {
            if self.enabled & (1 << ch) != 0 {
                return Some((ch, self.frequencies[ch]));
            }
            ch = (ch + 1) % self.max_count;
            if ch == start {
                return None;
            }
        }
    }
}

/// EU868 regional configuration: channel plan plus RX1/RX2 windowing
/// parameters, all mutable via the matching MAC commands.
#[derive(Debug, Clone)]
pub struct Region {
    channels: ChannelTable,
    rx1_dr_offset: u8,
    rx2_dr: DR,
    rx2_frequency: u32,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            channels: ChannelTable::default(),
            rx1_dr_offset: 0,
            // Matches the join channels: a device that hasn't yet been told
            // otherwise by a network server listens for RX2 where it would
            // also hear a retransmit on channel 0.
            rx2_dr: DR(0),
            rx2_frequency: JOIN_CHANNELS[0],
        }
    }
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks one of the three fixed join channels. The index doubles as the
    /// channel-table index, since `ChannelTable::default` seeds slots 0..3
    /// with the same frequencies, so the same index can be handed to
    /// `rx1_frequency` for both join and data frames.
    pub fn join_channel<RNG: RngCore>(&self, rng: &mut RNG) -> (usize, u32) {
        let idx = (rng.next_u32() % JOIN_CHANNELS.len() as u32) as usize;
        (idx, JOIN_CHANNELS[idx])
    }

    pub fn pick_data_channel<RNG: RngCore>(&self, rng: &mut RNG) -> Option<(usize, u32)> {
        self.channels.pick(rng)
    }

    pub fn channel_frequency(&self, index: usize) -> Option<u32> {
        self.channels.frequency(index)
    }

    pub fn max_payload_size(&self, dr: DR) -> u8 {
        datarate(dr).max_payload_size
    }

    pub fn datarate_params(&self, dr: DR) -> (SpreadingFactor, Bandwidth) {
        let d = datarate(dr);
        (d.spreading_factor, d.bandwidth)
    }

    pub fn rx1_frequency(&self, tx_channel: usize) -> u32 {
        self.channels.frequency(tx_channel).unwrap_or(JOIN_CHANNELS[0])
    }

    pub fn rx2_frequency(&self) -> u32 {
        self.rx2_frequency
    }

    pub fn rx1_datarate(&self, tx_dr: DR) -> DR {
        let shifted = tx_dr.value() as i16 - self.rx1_dr_offset as i16;
        let shifted = shifted.clamp(0, NUM_DATARATES as i16 - 1);
        DR(shifted as u8)
    }

    pub fn rx2_datarate(&self) -> DR {
        self.rx2_dr
    }

    pub fn rx1_dr_offset(&self) -> u8 {
        self.rx1_dr_offset
    }

    /// Applies RxParamSetupReq's parameters. Validation of each field
    /// happens in the caller (the MAC command engine), since the resulting
    /// status bits must be reported independently per field.
    pub fn set_rx2(&mut self, frequency: u32, dr: DR) {
        self.rx2_frequency = frequency;
        self.rx2_dr = dr;
    }

    /// Applies a Join-Accept DLSettings' RX2 data rate without disturbing
    /// the RX2 frequency (Join-Accept carries no RX2 frequency of its own;
    /// that only arrives later via RxParamSetupReq).
    pub fn set_rx2_datarate(&mut self, dr: DR) {
        self.rx2_dr = dr;
    }

    pub fn set_rx1_dr_offset(&mut self, offset: u8) {
        self.rx1_dr_offset = offset;
    }

    pub fn frequency_valid(&self, freq: u32) -> bool {
        (860_000_000..=870_000_000).contains(&freq)
    }

    pub fn dr_valid(&self, dr: u8) -> bool {
        (dr as usize) < NUM_DATARATES
    }

    /// Applies a CFList of type 0 (dynamic channel list), filling channels
    /// 3..8. A zero frequency disables the corresponding channel.
    pub fn handle_cflist(&mut self, cflist: &CfList) {
        if let CfList::DynamicChannel(frequencies) = cflist {
            for (i, freq) in frequencies.iter().enumerate() {
                let value = freq.value();
                let index = 3 + i;
                if value != 0 {
                    self.channels.set(index, value);
                } else {
                    self.channels.enable(index, false);
                }
            }
        }
    }

    pub fn set_channel(&mut self, index: usize, freq: u32) -> bool {
        self.channels.set(index, freq)
    }

    pub fn channel_exists(&self, index: usize) -> bool {
        self.channels.exists(index)
    }

    /// Applies LinkADRReq's channel mask using the simple ChMaskCntl scheme:
    /// control value 0 applies `mask` bit-for-bit to channels 0..15,
    /// control value 6 force-enables every channel, anything else is
    /// rejected outright (dry_run lets the caller check before committing).
    pub fn handle_adr_channel_mask(&mut self, cntl: u8, mask: u16, dry_run: bool) -> bool {
        match cntl {
            0 => {
                if dry_run {
                    for i in 0..NUM_CHANNELS {
                        if mask & (1 << i) != 0 && !self.channels.exists(i) && i >= 3 {
                            return false;
                        }
                    }
                    true
                } else {
                    for i in 3..NUM_CHANNELS {
                        self.channels.enable(i, mask & (1 << i) != 0);
                    }
                    true
                }
            }
            6 => {
                if !dry_run {
                    for i in 0..self.channels.max_count.max(3) {
                        self.channels.enable(i, true);
                    }
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_the_three_join_channels() {
        let region = Region::new();
        assert!(region.channel_exists(0));
        assert!(region.channel_exists(1));
        assert!(region.channel_exists(2));
        assert!(!region.channel_exists(3));
    }

    #[test]
    fn disabling_the_highest_channel_shrinks_the_pick_range() {
        let mut table = ChannelTable::default();
        table.set(3, 867_100_000);
        assert_eq!(table.max_count, 4);
        table.enable(3, false);
        assert_eq!(table.max_count, 3);
    }

    #[test]
    fn cflist_disables_on_zero_frequency() {
        let mut region = Region::new();
        region.set_channel(3, 867_100_000);
        assert!(region.channel_exists(3));
        region.channels.enable(3, false);
        assert!(!region.channel_exists(3));
    }

    #[test]
    fn adr_channel_mask_cntl_6_enables_all_known_channels() {
        let mut region = Region::new();
        region.set_channel(3, 867_100_000);
        region.channels.enable(3, false);
        assert!(region.handle_adr_channel_mask(6, 0, false));
        assert!(region.channel_exists(3));
    }

    #[test]
    fn adr_channel_mask_unknown_cntl_is_rejected() {
        let mut region = Region::new();
        assert!(!region.handle_adr_channel_mask(3, 0xFFFF, true));
    }
}
