#![allow(dead_code)]
use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};

pub(crate) const RECEIVE_DELAY1: u32 = 1000;
pub(crate) const RECEIVE_DELAY2: u32 = RECEIVE_DELAY1 + 1000; // must be RECEIVE_DELAY1 + 1 s
pub(crate) const JOIN_ACCEPT_DELAY1: u32 = 5000;
pub(crate) const JOIN_ACCEPT_DELAY2: u32 = 6000;

pub(crate) const ADR_ACK_LIMIT: u32 = 64;
pub(crate) const ADR_ACK_DELAY: u32 = 32;

pub(crate) const NUM_CHANNELS: usize = 16;
pub(crate) const NUM_DATARATES: usize = 6;

pub(crate) const DEFAULT_BANDWIDTH: Bandwidth = Bandwidth::_125KHz;
pub(crate) const DEFAULT_SPREADING_FACTOR: SpreadingFactor = SpreadingFactor::_7;
pub(crate) const DEFAULT_CODING_RATE: CodingRate = CodingRate::_4_5;

/// EU868 default Max EIRP, dBm, per LoRaWAN Regional Parameters.
pub(crate) const DEFAULT_MAX_EIRP: i8 = 16;
/// Each increment of a LinkADRReq/`set_tx_power` index steps down by 2 dB from Max EIRP.
pub(crate) const TX_POWER_STEP_DB: i8 = 2;
/// Highest legal TX power index (LinkADRReq index 0..=7).
pub(crate) const MAX_TX_POWER_INDEX: u8 = 7;
